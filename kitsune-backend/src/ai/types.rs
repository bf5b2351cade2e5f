use std::fmt;

/// Failure of a single completion request. Nothing is retried; the caller
/// logs the error and drops the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// The request never produced an HTTP response
    Request(String),
    /// The provider answered with a non-success status
    Api { status: u16, message: String },
    /// The response body was not a valid completion response
    Decode(String),
    /// The provider returned zero choices
    EmptyResponse,
    /// Mock client ran out of queued responses
    MockExhausted,
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiError::Request(e) => write!(f, "completion request failed: {}", e),
            AiError::Api { status, message } => {
                write!(f, "completion API error ({}): {}", status, message)
            }
            AiError::Decode(e) => write!(f, "failed to decode completion response: {}", e),
            AiError::EmptyResponse => write!(f, "completion API returned no choices"),
            AiError::MockExhausted => write!(f, "mock AI client has no queued responses"),
        }
    }
}

impl std::error::Error for AiError {}
