/// Failures raised by a chunk source before or while the response body is read.
///
/// The orchestrator never returns these to its caller: the displayed text
/// becomes the message of a synthesised `Failed` event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The request could not be sent or the connection failed.
    #[error("generation request failed: {message}")]
    Request { message: String },
    /// The server answered with a non-success status.
    #[error("generation request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The server answered without a streaming body.
    #[error("server did not return a streaming body")]
    EmptyBody,
    /// Reading the next chunk of the body failed.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl SourceError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a mid-stream read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Top-level error type for the client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid generation request.
    #[error("validation error: {0}")]
    Validation(String),
    /// A spawned generation run ended without handing back its state.
    #[error("generation task error: {0}")]
    Task(String),
}
