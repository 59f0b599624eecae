use gh_activity::error::{CollectorError, Result};
use std::error::Error;

#[test]
fn test_error_display() {
    let error = CollectorError::RateLimitExceeded("Rate limit hit".to_string());
    assert_eq!(format!("{}", error), "Rate limit exceeded: Rate limit hit");

    let error = CollectorError::NotFound("organization ghost".to_string());
    assert_eq!(format!("{}", error), "Resource not found: organization ghost");

    let error = CollectorError::AuthError("Bad credentials".to_string());
    assert_eq!(format!("{}", error), "Authentication error: Bad credentials");

    let error = CollectorError::MalformedResponseError("missing pageInfo".to_string());
    assert_eq!(format!("{}", error), "Malformed response: missing pageInfo");

    let error = CollectorError::CsvError {
        line: 3,
        message: "unterminated quoted field".to_string(),
    };
    assert_eq!(format!("{}", error), "CSV error at line 3: unterminated quoted field");
}

#[test]
fn test_error_source() {
    let error = CollectorError::RateLimitExceeded("Rate limit hit".to_string());
    assert!(error.source().is_none());

    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let error: CollectorError = io_error.into();
    assert!(error.source().is_some());
}

#[test]
fn test_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: CollectorError = io_error.into();
    assert!(matches!(error, CollectorError::IoError(_)));
}

#[test]
fn test_retryable_and_fatal() {
    let transient = CollectorError::TransientNetworkError("connection reset".to_string());
    assert!(transient.is_retryable());
    assert!(transient.is_fatal());

    let auth = CollectorError::AuthError("Bad credentials".to_string());
    assert!(!auth.is_retryable());
    assert!(auth.is_fatal());

    assert!(CollectorError::RateLimitExceeded("budget".to_string()).is_fatal());

    // these skip one org or repository instead of ending the run
    assert!(!CollectorError::MalformedResponseError("bad".to_string()).is_fatal());
    assert!(!CollectorError::NotFound("repo".to_string()).is_fatal());
    assert!(!CollectorError::ApiError("forbidden".to_string()).is_fatal());
}

#[test]
fn test_result_type() {
    fn returns_result() -> Result<String> {
        Ok("success".to_string())
    }

    let result = returns_result();
    assert!(result.is_ok());
    assert_eq!(result.unwrap(), "success");

    fn returns_error() -> Result<String> {
        Err(CollectorError::NotFound("Not found".to_string()))
    }

    let result = returns_error();
    assert!(result.is_err());
}
