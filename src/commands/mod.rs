pub mod config;
pub mod permissions;
pub mod scan;

pub use self::config::*;
pub use self::permissions::*;
pub use self::scan::*;
