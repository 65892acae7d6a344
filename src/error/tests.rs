//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid socket");
        assert_eq!(err.to_string(), "configuration error: invalid socket");
    }

    #[test]
    fn test_storage_error_conversion() {
        let storage_err = StorageError::Database("connection failed".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_storage_error_closed() {
        let err: Error = StorageError::Closed.into();
        assert_eq!(err.to_string(), "storage error: store is closed");
    }

    #[test]
    fn test_storage_error_encoding() {
        let err = StorageError::encoding(b"file:/tmp/a", "expected value");
        assert_eq!(
            err.to_string(),
            "encoding error for key 'file:/tmp/a': expected value"
        );
    }

    #[test]
    fn test_storage_error_database_helper() {
        let err = StorageError::database("disk full");
        assert_eq!(err.to_string(), "database error: disk full");
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/test".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
        assert_eq!(
            err.to_string(),
            "watcher error: failed to watch path '/tmp/test': permission denied"
        );
    }

    #[test]
    fn test_ignore_error_conversion() {
        let ignore_err = IgnoreError::InvalidPattern {
            pattern: "a/**/[".to_string(),
            reason: "unclosed character class".to_string(),
        };
        let err: Error = ignore_err.into();
        assert!(matches!(err, Error::Ignore(_)));
    }

    #[test]
    fn test_server_error_conversion() {
        let server_err = ServerError::BindFailed {
            address: "/tmp/fscache.socket".to_string(),
            reason: "address in use".to_string(),
        };
        let err: Error = server_err.into();
        assert!(matches!(err, Error::Server(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_server_error_protocol() {
        let err = ServerError::Protocol("unexpected message".to_string());
        assert_eq!(err.to_string(), "protocol error: unexpected message");
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("test internal error");
        assert_eq!(err.to_string(), "internal error: test internal error");
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
