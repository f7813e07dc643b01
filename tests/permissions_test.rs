#[cfg(test)]
mod permissions_tests {
    use crabscan::permissions::{
        check_permission, check_permission_detailed, ensure_camera_access, PermissionStatus,
    };

    #[test]
    fn test_check_permission_is_consistent() {
        let first = check_permission();
        for _ in 0..5 {
            assert_eq!(check_permission(), first, "Permission status should be consistent");
        }
    }

    #[test]
    fn test_detailed_matches_simple() {
        let info = check_permission_detailed();
        assert_eq!(info.status, check_permission());
        assert!(!info.message.is_empty());
    }

    #[test]
    fn test_ensure_access_agrees_with_status() {
        let status = check_permission();
        let result = ensure_camera_access();
        match status {
            PermissionStatus::Denied | PermissionStatus::Restricted => {
                assert!(result.unwrap_err().is_terminal())
            }
            PermissionStatus::Granted | PermissionStatus::NotDetermined => assert!(result.is_ok()),
        }
    }

    #[test]
    fn test_check_permission_concurrent() {
        let handles: Vec<_> = (0..10)
            .map(|_| std::thread::spawn(check_permission))
            .collect();

        for handle in handles {
            let _ = handle.join().unwrap();
        }
    }

    #[test]
    fn test_permission_info_serializes() {
        let json = serde_json::to_string(&check_permission_detailed()).unwrap();
        assert!(json.contains("\"status\""));
        assert!(json.contains("\"can_request\""));
    }
}
