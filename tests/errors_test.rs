#[cfg(test)]
mod error_tests {
    use crabscan::errors::ScanError;
    use std::error::Error;

    #[test]
    fn test_scan_error_permission_denied() {
        let error = ScanError::PermissionDenied("Access denied".to_string());
        assert!(error.to_string().contains("Permission denied"));
        assert!(error.to_string().contains("Access denied"));
        assert!(error.is_terminal());
    }

    #[test]
    fn test_scan_error_device_not_found_is_terminal() {
        let error = ScanError::DeviceNotFound("camera 3".to_string());
        assert_eq!(error.to_string(), "Camera not found: camera 3");
        assert!(error.is_terminal());
    }

    #[test]
    fn test_recoverable_errors() {
        let errors = [
            ScanError::InitializationError("init".to_string()),
            ScanError::StreamError("stream".to_string()),
            ScanError::CaptureError("capture".to_string()),
            ScanError::DetectionError("detect".to_string()),
            ScanError::EncodingError("encode".to_string()),
            ScanError::ConfigError("config".to_string()),
            ScanError::InvalidState("state".to_string()),
        ];
        for error in errors {
            assert!(!error.is_terminal(), "{:?} should not be terminal", error);
        }
    }

    #[test]
    fn test_scan_error_display_trait() {
        let error = ScanError::CaptureError("Display test".to_string());
        assert_eq!(format!("{}", error), "Capture error: Display test");
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: ScanError = io.into();
        assert!(error.to_string().contains("gone"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_image_error_becomes_encoding_error() {
        let image_error = image::load_from_memory(&[0u8, 1, 2, 3]).unwrap_err();
        let error: ScanError = image_error.into();
        assert!(matches!(error, ScanError::EncodingError(_)));
    }

    #[test]
    fn test_scan_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScanError>();
    }
}
