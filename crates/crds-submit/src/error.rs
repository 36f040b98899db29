//! Error types for the submission client.

/// Failures raised below the protocol layer, while moving bytes.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Too many redirects starting from {url}")]
    TooManyRedirects { url: String },

    #[error("Background worker stopped before {url} completed")]
    WorkerStopped { url: String },

    #[error("Stopped waiting for {url} after {waited_ms} ms; request abandoned")]
    Abandoned { url: String, waited_ms: u128 },
}

/// All errors that can occur while talking to the submission server.
#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    /// Client could not be constructed: no async runtime, unusable base
    /// URL, HTTP client build failure, or a missing credential.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP failure status or one or more error banners on the page.
    #[error("A web transaction with {url} had {} error(s): {}", .messages.len(), .messages.join("; "))]
    ServerTransaction { url: String, messages: Vec<String> },

    #[error("Login failed with {} error(s): {}", .messages.len(), .messages.join("; "))]
    Authentication { messages: Vec<String> },

    #[error(
        "User {user:?} has already locked {instrument:?}. Failing to avert collisions; \
         logout on the website (or run `logout`) to bypass."
    )]
    LockConflict { user: String, instrument: String },

    #[error("Protocol state error: {0}")]
    ProtocolState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SubmitError {
    /// Number of server-reported errors carried by a classification failure.
    pub fn error_count(&self) -> usize {
        match self {
            SubmitError::ServerTransaction { messages, .. }
            | SubmitError::Authentication { messages } => messages.len(),
            _ => 0,
        }
    }
}

/// Convenience result type.
pub type SubmitResult<T> = Result<T, SubmitError>;
