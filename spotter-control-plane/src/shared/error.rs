use spotter_core::{CoreError, ErrorResponse};
use thiserror::Error;

/// Spotter control plane errors
#[derive(Debug, Error)]
pub enum SpotterError {
    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),
    #[error("No qualifying candidate: {0}")]
    NoQualifyingCandidate(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("No recommendation available for cluster {0}")]
    NoRecommendationAvailable(String),
    #[error("Launch failed: {0}")]
    LaunchFailed(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl SpotterError {
    /// Fatal errors end the invocation and are reported to the caller.
    /// Neither kind is retried here.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SpotterError::PriceUnavailable(_) | SpotterError::NoQualifyingCandidate(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SpotterError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            SpotterError::NoQualifyingCandidate(_) => "NO_QUALIFYING_CANDIDATE",
            SpotterError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            SpotterError::NoRecommendationAvailable(_) => "NO_RECOMMENDATION_AVAILABLE",
            SpotterError::LaunchFailed(_) => "LAUNCH_FAILED",
            SpotterError::Timeout(_) => "TIMEOUT",
            SpotterError::InvalidRequest(_) => "INVALID_REQUEST",
            SpotterError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }
}

impl From<CoreError> for SpotterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidEvent(msg) => SpotterError::InvalidRequest(msg),
            CoreError::InvalidConfiguration(msg)
            | CoreError::InvalidTransition(msg)
            | CoreError::SerializationError(msg) => SpotterError::ValidationError(msg),
        }
    }
}

impl From<SpotterError> for ErrorResponse {
    fn from(err: SpotterError) -> Self {
        let code = err.error_code();
        let message = match err {
            SpotterError::PriceUnavailable(msg)
            | SpotterError::NoQualifyingCandidate(msg)
            | SpotterError::StoreUnavailable(msg)
            | SpotterError::NoRecommendationAvailable(msg)
            | SpotterError::LaunchFailed(msg)
            | SpotterError::Timeout(msg)
            | SpotterError::InvalidRequest(msg)
            | SpotterError::ValidationError(msg) => msg,
        };

        ErrorResponse::new(code, message)
    }
}

pub type SpotterResult<T> = std::result::Result<T, SpotterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SpotterError::StoreUnavailable("etcd unreachable".to_string());
        assert_eq!(err.to_string(), "Store unavailable: etcd unreachable");

        let err = SpotterError::NoRecommendationAvailable("prod".to_string());
        assert!(err.to_string().contains("prod"));
    }

    #[test]
    fn test_fatality() {
        assert!(!SpotterError::PriceUnavailable("t3.medium".to_string()).is_fatal());
        assert!(!SpotterError::NoQualifyingCandidate("none".to_string()).is_fatal());
        assert!(SpotterError::StoreUnavailable("x".to_string()).is_fatal());
        assert!(SpotterError::NoRecommendationAvailable("x".to_string()).is_fatal());
        assert!(SpotterError::LaunchFailed("x".to_string()).is_fatal());
        assert!(SpotterError::Timeout("x".to_string()).is_fatal());
    }

    #[test]
    fn test_conversion_to_error_response() {
        let response: ErrorResponse =
            SpotterError::NoRecommendationAvailable("prod".to_string()).into();
        assert_eq!(response.error_code, "NO_RECOMMENDATION_AVAILABLE");
        assert_eq!(response.message, "prod");

        let response: ErrorResponse = SpotterError::LaunchFailed("capacity".to_string()).into();
        assert_eq!(response.error_code, "LAUNCH_FAILED");
        assert_eq!(response.message, "capacity");

        let response: ErrorResponse = SpotterError::Timeout("deadline".to_string()).into();
        assert_eq!(response.error_code, "TIMEOUT");
    }

    #[test]
    fn test_core_error_conversion() {
        let err: SpotterError = CoreError::InvalidEvent("wrong source".to_string()).into();
        assert!(matches!(err, SpotterError::InvalidRequest(_)));

        let err: SpotterError = CoreError::InvalidConfiguration("no subnets".to_string()).into();
        assert!(matches!(err, SpotterError::ValidationError(_)));
    }

    #[test]
    fn test_result_type() {
        let ok: SpotterResult<u32> = Ok(1);
        let err: SpotterResult<u32> = Err(SpotterError::InvalidRequest("bad".to_string()));

        assert_eq!(ok.unwrap(), 1);
        assert_eq!(err.unwrap_err().to_string(), "Invalid request: bad");
    }
}
