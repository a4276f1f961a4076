//! Shared API response models
//!
//! Unified request/response envelopes so every service endpoint reports
//! success and failure the same way.

use serde::{Deserialize, Serialize};

/// Standard success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    /// Success indicator (always true)
    pub success: bool,
    /// Response data
    pub data: T,
}

impl<T> SuccessResponse<T> {
    /// Create a new success response
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Standard error response
///
/// `errors` carries every individual violation when an operation fails
/// validation, not just the first one found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Success indicator (always false for errors)
    pub success: bool,
    /// Short error kind, e.g. "validation" or "conflict"
    pub kind: String,
    /// One entry per individual failure
    pub errors: Vec<String>,
}

impl ErrorResponse {
    /// Create an error response with a single message
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: kind.into(),
            errors: vec![message.into()],
        }
    }

    /// Create an error response carrying a list of violations
    pub fn with_errors(kind: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            kind: kind.into(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let resp = SuccessResponse::new(42u32);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"data\":42"));
    }

    #[test]
    fn test_error_envelope_collects_all_violations() {
        let resp = ErrorResponse::with_errors(
            "validation",
            vec!["unit id out of range".into(), "overlapping points".into()],
        );
        assert!(!resp.success);
        assert_eq!(resp.errors.len(), 2);
    }
}
