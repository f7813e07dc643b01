//! Runtime invariants with contract tracking
//!
//! Production code states its invariants with [`assert_invariant!`]. Every
//! check is recorded per thread, so a contract test can prove that the code
//! path under test actually exercised the invariants it claims to hold.
//!
//! ```rust,ignore
//! use crabscan::invariant_ppt::*;
//!
//! assert_invariant!(
//!     counter <= threshold,
//!     "Stability counter stays within threshold",
//!     "stability::evaluate"
//! );
//!
//! #[test]
//! fn contract_stability() {
//!     // ... drive the tracker ...
//!     contract_test("stability", &["Stability counter stays within threshold"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;

thread_local! {
    static CHECKED: RefCell<BTreeSet<&'static str>> = const { RefCell::new(BTreeSet::new()) };
}

/// Check an invariant and record that it was checked.
///
/// Panics with the invariant message (and optional context) when the
/// condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::check_invariant($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::check_invariant($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn check_invariant(condition: bool, message: &'static str, context: Option<&str>) {
    CHECKED.with(|checked| {
        checked.borrow_mut().insert(message);
    });

    if !condition {
        panic!(
            "INVARIANT VIOLATION [{}]: {}",
            context.unwrap_or("unknown"),
            message
        );
    }
}

/// Invariants recorded on the current thread, sorted.
pub fn checked_invariants() -> Vec<&'static str> {
    CHECKED.with(|checked| checked.borrow().iter().copied().collect())
}

/// Fail unless every listed invariant was checked on this thread.
pub fn contract_test(test_name: &str, required: &[&str]) {
    let checked = checked_invariants();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|inv| !checked.iter().any(|c| c == inv))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

pub fn clear_invariant_log() {
    CHECKED.with(|checked| checked.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_invariants_are_recorded() {
        clear_invariant_log();
        crate::assert_invariant!(true, "always holds");
        assert_eq!(checked_invariants(), vec!["always holds"]);
        contract_test("recorded", &["always holds"]);
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_missing_invariant_fails_contract() {
        clear_invariant_log();
        contract_test("missing", &["never checked"]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [unit]")]
    fn test_violation_panics_with_context() {
        crate::assert_invariant!(1 > 2, "one exceeds two", "unit");
    }
}
