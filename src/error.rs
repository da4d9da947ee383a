//! Error types for qail-druid.

use thiserror::Error;

/// Druid driver error types.
#[derive(Debug, Error)]
pub enum DruidError {
    /// Missing or invalid configuration (bad DSN, no broker address, unknown date format).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The outbound request could not be built.
    #[error("Error forming request: {0}")]
    RequestForm(String),

    /// Network-level failure reaching the broker.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The broker answered a query with a non-2xx status.
    #[error("Query failed with status {status}: {body}")]
    Query { status: u16, body: String },

    /// The response body is malformed for the selected wire format.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The query succeeded but returned nothing, not even a header.
    #[error("No rows returned")]
    NoRows,

    /// A row could not be read into the supplied destinations.
    #[error("Scan error: {0}")]
    Scan(String),

    /// The caller cancelled the query before a result arrived.
    #[error("Query cancelled")]
    Cancelled,

    /// The caller's deadline passed before a result arrived.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Health check failed.
    #[error("Error fetching health info from druid: {0}")]
    Ping(String),

    /// The connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl DruidError {
    /// True for errors produced by a fired [`Context`](crate::Context).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// HTTP status of a failed query, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Query { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DruidError {
    fn from(e: serde_json::Error) -> Self {
        DruidError::Decode(e.to_string())
    }
}

/// Result type for Druid operations.
pub type DruidResult<T> = Result<T, DruidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DruidError::Query {
            status: 400,
            body: "{\"error\":\"SQL parse failed\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Query failed with status 400: {\"error\":\"SQL parse failed\"}"
        );
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_is_cancellation() {
        assert!(DruidError::Cancelled.is_cancellation());
        assert!(DruidError::DeadlineExceeded.is_cancellation());
        assert!(!DruidError::NoRows.is_cancellation());
        assert!(!DruidError::Decode("x".into()).is_cancellation());
    }

    #[test]
    fn test_from_serde_json() {
        let err: DruidError = serde_json::from_str::<Vec<i64>>("[1,")
            .unwrap_err()
            .into();
        assert!(matches!(err, DruidError::Decode(_)));
    }
}
