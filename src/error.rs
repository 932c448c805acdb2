//! Error types for linkpool
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

/// All error types that can occur in linkpool
#[derive(Debug, Error)]
pub enum LinkpoolError {
    /// Configuration rejected before the pool was built
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The pool actor has shut down
    #[error("Task pool is closed")]
    PoolClosed,

    /// URL could not be parsed or is not fetchable
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Remote answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// A fetch attempt ran past its deadline
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for linkpool operations
pub type Result<T> = std::result::Result<T, LinkpoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_error() {
        let err = LinkpoolError::InvalidConfig("max_concurrency must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid config: max_concurrency must be at least 1");
    }

    #[test]
    fn test_pool_closed_error() {
        assert_eq!(LinkpoolError::PoolClosed.to_string(), "Task pool is closed");
    }

    #[test]
    fn test_status_error() {
        let err = LinkpoolError::Status {
            url: "https://example.com/".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://example.com/");
    }

    #[test]
    fn test_timeout_error() {
        let err = LinkpoolError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Fetch timed out after 250ms");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LinkpoolError = io_err.into();
        assert!(matches!(err, LinkpoolError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: LinkpoolError = json_err.into();
        assert!(matches!(err, LinkpoolError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<u32>("not: [a number").unwrap_err();
        let err: LinkpoolError = yaml_err.into();
        assert!(matches!(err, LinkpoolError::Yaml(_)));
    }
}
