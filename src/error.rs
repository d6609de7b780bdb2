use crate::provider::ApiError;
use thiserror::Error;

/// Errors surfaced by the domain model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown server code: {0}")]
    InvalidServerCode(String),
    #[error("Unknown station code: {0}")]
    InvalidStationCode(String),
    #[error("Identity mismatch for {entity}: expected {expected}, got {actual}")]
    IdentityMismatch {
        entity: &'static str,
        expected: String,
        actual: String,
    },
    #[error("No live timetable position known yet")]
    NoLiveData,
    #[error("Timetable index {index} out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("Object already destroyed")]
    ObjectDestroyed,
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_server_code() {
        let err = CoreError::InvalidServerCode("xx99".into());
        assert_eq!(err.to_string(), "Unknown server code: xx99");
    }

    #[test]
    fn error_display_identity_mismatch() {
        let err = CoreError::IdentityMismatch {
            entity: "train",
            expected: "111".into(),
            actual: "222".into(),
        };
        assert_eq!(
            err.to_string(),
            "Identity mismatch for train: expected 111, got 222"
        );
    }

    #[test]
    fn error_display_index_out_of_range() {
        let err = CoreError::IndexOutOfRange { index: 7, size: 7 };
        assert_eq!(err.to_string(), "Timetable index 7 out of range (size 7)");
    }

    #[test]
    fn error_from_api_error() {
        let err: CoreError = ApiError::NotFound("train 4144".into()).into();
        assert!(matches!(err, CoreError::Api(ApiError::NotFound(_))));
        assert!(err.to_string().contains("train 4144"));
    }

    #[test]
    fn error_from_json_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("not valid json!!!");
        if let Err(json_err) = result {
            let err: CoreError = json_err.into();
            assert!(matches!(err, CoreError::Json(_)));
        }
    }
}
