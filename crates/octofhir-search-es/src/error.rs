use thiserror::Error;

/// Errors raised while parsing, compiling or resolving FHIR search queries.
///
/// Every validation problem with a client supplied search is reported as
/// [`SearchError::InvalidSearchParameter`]; the message is meant to be shown
/// to the caller verbatim.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{0}")]
    InvalidSearchParameter(String),

    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    /// Create a new InvalidSearchParameter error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidSearchParameter(message.into())
    }

    /// Create a new Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidSearchParameter(_))
    }
}

impl From<anyhow::Error> for SearchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_message_is_verbatim() {
        let err = SearchError::invalid("Invalid search parameter 'foo' for resource type Patient");
        assert_eq!(
            err.to_string(),
            "Invalid search parameter 'foo' for resource type Patient"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_backend_is_not_client_error() {
        let err = SearchError::from(anyhow::anyhow!("connection reset"));
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Search backend error: connection reset");
    }
}
