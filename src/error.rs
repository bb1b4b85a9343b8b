//! Error types for the claims realtime client

use thiserror::Error;

/// Result type alias for fallible operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the REST collaborator, envelope decoding and configuration
///
/// The connection manager and the registries never return these to callers;
/// transport and decode failures there are logged and surfaced as state changes.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {0}")]
    Api(String),

    /// Inbound frame could not be turned into a push message
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_api() {
        let err = Error::Api("HTTP 500 - boom".to_string());
        assert_eq!(err.to_string(), "API error: HTTP 500 - boom");
    }

    #[test]
    fn test_error_display_decode() {
        let err = Error::Decode("missing field `type`".to_string());
        assert_eq!(err.to_string(), "Decode error: missing field `type`");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("CLAIMS_HEARTBEAT_SECS: invalid digit".to_string());
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_error_display_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn test_error_display_http() {
        let client = reqwest::Client::new();
        let result = client.get("http://invalid.invalid.invalid").send().await;
        if let Err(reqwest_err) = result {
            let err: Error = reqwest_err.into();
            assert!(err.to_string().starts_with("HTTP error:"));
            assert!(matches!(err, Error::Http(_)));
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
