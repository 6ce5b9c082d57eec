use std::time::Duration;
use thiserror::Error;

/// Raised while mapping canonical messages to or from a backend's native shape.
///
/// These always surface before any network call is made for the request.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Unsupported image source type: {0}")]
    UnsupportedImageSource(String),

    #[error("Model {0} does not accept image input")]
    ImagesNotSupported(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),

    #[error("Invalid tool name for this backend: {0}")]
    InvalidToolName(String),

    #[error("Duplicate tool use id: {0}")]
    DuplicateToolUseId(String),

    #[error("Tool result references unknown tool use id: {0}")]
    UnknownToolUseId(String),

    #[error("Invalid input schema for tool {name}: {reason}")]
    InvalidToolSchema { name: String, reason: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Server error: {status} - {message}")]
    Server {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Context length exceeded. Message: {0}")]
    ContextLengthExceeded(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Stream terminated after partial output: {0}")]
    StreamTerminated(#[source] Box<ProviderError>),
}

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Conversion,
    TransientBackend,
    PermanentBackend,
    StreamTermination,
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Configuration(_) => ErrorClass::Configuration,
            ProviderError::Conversion(_) => ErrorClass::Conversion,
            ProviderError::RateLimited { .. }
            | ProviderError::Server { .. }
            | ProviderError::Connection(_) => ErrorClass::TransientBackend,
            ProviderError::Authentication(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::ContextLengthExceeded(_)
            | ProviderError::Unsupported(_)
            | ProviderError::Protocol(_) => ErrorClass::PermanentBackend,
            ProviderError::StreamTerminated(_) => ErrorClass::StreamTermination,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientBackend
    }

    /// Backend supplied hint for how long to wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. }
            | ProviderError::Server { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Protocol(err.to_string())
        } else if err.is_builder() {
            ProviderError::Configuration(err.to_string())
        } else {
            // timeouts, resets and refused connections are all worth another attempt
            ProviderError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Protocol(err.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let rate_limited = ProviderError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(rate_limited.is_transient());
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(2)));

        let auth = ProviderError::Authentication("bad key".to_string());
        assert_eq!(auth.class(), ErrorClass::PermanentBackend);
        assert!(!auth.is_transient());

        let conversion: ProviderError =
            ConversionError::UnsupportedContentType("audio".to_string()).into();
        assert_eq!(conversion.class(), ErrorClass::Conversion);
        assert_eq!(conversion.to_string(), "Unsupported content type: audio");

        let terminated = ProviderError::StreamTerminated(Box::new(ProviderError::Connection(
            "reset".to_string(),
        )));
        assert_eq!(terminated.class(), ErrorClass::StreamTermination);
        assert!(!terminated.is_transient());
    }
}
