//! Completion service errors.

use thiserror::Error;

/// Boxed error kept as the diagnostic cause of a stream failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while configuring a completion client.
#[derive(Error, Debug)]
pub enum AiError {
    /// API key not found in environment variables or settings.
    #[error("OpenAI API key not found. Set OPENAI_API_KEY or GITSCRIBE_API_KEY, or USE_OLLAMA=true for a local server")]
    ApiKeyNotFound,

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Where a stream failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// The request never reached the service or the connection broke.
    Transport,
    /// The service answered with an error.
    Service,
    /// The service answered with something that could not be understood.
    Protocol,
}

/// Failure delivered through the terminal `Error` stream event.
///
/// `message` is what users see; `cause` is kept for diagnostics only.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct StreamError {
    /// Origin of the failure.
    pub kind: StreamErrorKind,
    /// User-facing message.
    pub message: String,
    /// Underlying error, if any.
    #[source]
    pub cause: Option<BoxError>,
}

impl StreamError {
    /// Creates an error without an underlying cause.
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// A network-level failure.
    pub fn transport(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::new(StreamErrorKind::Transport, message).with_cause(cause)
    }

    /// An error reported by the service itself.
    pub fn service(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Service, message)
    }

    /// A response that could not be decoded.
    pub fn protocol(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::new(StreamErrorKind::Protocol, message).with_cause(cause)
    }

    /// Renders the message followed by every cause, for logs.
    pub fn diagnostic(&self) -> String {
        let mut out = self.message.clone();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}
