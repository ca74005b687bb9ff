//! Tests for error types

use trueno_fetch::error::RetryBudget;
use trueno_fetch::Error;

#[test]
fn test_invalid_filter_error() {
    let error = Error::InvalidFilter("ordering on a bool literal".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid filter"));
    assert!(error_str.contains("bool literal"));
}

#[test]
fn test_type_inference_error() {
    let error = Error::AttributeTypeInference {
        path: "config/batch_size".to_string(),
        types: vec!["float".to_string(), "int".to_string()],
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("config/batch_size"));
    assert!(error_str.contains("\"float\""));
    assert!(error_str.contains("\"int\""));
    assert!(error_str.contains("Declare the type explicitly"));
}

#[test]
fn test_conflicting_types_error() {
    let error = Error::ConflictingAttributeTypes {
        path: "config/batch_size".to_string(),
        types: vec!["float".to_string(), "int".to_string()],
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Conflicting attribute types"));
    assert!(error_str.contains("type suffixes"));
}

#[test]
fn test_retry_budget_error() {
    let error = Error::RetryBudgetExceeded {
        budget: RetryBudget::Hard,
        attempts: 4,
        last_error: "HTTP 429".to_string(),
    };
    let error_str = format!("{error}");
    assert_eq!(
        error_str,
        "Retry budget exceeded (hard) after 4 attempt(s): HTTP 429"
    );
    assert_eq!(RetryBudget::Soft.to_string(), "soft");
}

#[test]
fn test_non_retryable_error() {
    let error = Error::NonRetryableRequest {
        status: 403,
        message: "forbidden".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("HTTP 403"));
    assert!(error_str.contains("forbidden"));
}

#[test]
fn test_unexpected_response_error() {
    let error = Error::UnexpectedResponse("query rejected".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Unexpected response"));
    assert!(error_str.contains("query rejected"));
}

#[test]
fn test_user_misuse_error() {
    let error = Error::UserMisuse("mixed entity kinds".to_string());
    assert_eq!(format!("{error}"), "Invalid usage: mixed entity kinds");
}

#[test]
fn test_invalid_argument_error() {
    let error = Error::InvalidArgument("bucket limit must be positive".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid argument"));
    assert!(error_str.contains("bucket limit"));
}

#[test]
fn test_arrow_error_conversion() {
    let arrow_error = arrow::error::ArrowError::SchemaError("bad schema".to_string());
    let error: Error = arrow_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("Arrow error"));
    assert!(error_str.contains("bad schema"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    let error_str = format!("{error}");
    assert_eq!(error_str, "custom error message");
}

#[test]
fn test_error_debug() {
    let error = Error::Cancelled;
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Cancelled"));
}

#[test]
fn test_result_type_alias() {
    #[allow(clippy::unnecessary_wraps)]
    fn returns_result() -> trueno_fetch::Result<i32> {
        Ok(42)
    }

    let result = returns_result();
    assert!(result.is_ok());
    assert_eq!(result.unwrap(), 42);
}

#[test]
fn test_result_type_alias_error() {
    fn returns_error() -> trueno_fetch::Result<i32> {
        Err(Error::Other("test error".to_string()))
    }

    let result = returns_error();
    assert!(result.is_err());
}
