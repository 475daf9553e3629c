//! Client error types.

use stripemeter_core::CoreError;

/// Errors that can occur when using the Stripemeter client.
///
/// Every error is classified as either permanent (retrying the same request
/// cannot succeed) or transient. See [`ClientError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Server answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Best-effort message from the error body, or the status text.
        message: String,
        /// Decoded error body, if it was JSON.
        data: Option<serde_json::Value>,
    },

    /// No HTTP response was received (timeout, refused connection, DNS).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A request body could not be encoded or a 2xx response decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event was rejected locally before any request was made.
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] CoreError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client has been closed and no longer buffers events.
    #[error("client is closed")]
    Closed,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl ClientError {
    /// Build a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Transport(message.into())
    }

    /// HTTP status associated with the error, `0` when there was none.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Api { status, .. } => *status,
            _ => 0,
        }
    }

    /// Whether the request itself is at fault and must not be retried.
    ///
    /// Client-error statuses (`400..500`) and anything detected before or
    /// after the exchange are permanent.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Whether the failure is transient: a 5xx status or no response at all.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => !(400..500).contains(status),
            Self::Transport(_) => true,
            Self::Serialization(_) | Self::InvalidEvent(_) | Self::Configuration(_) | Self::Closed => {
                false
            }
        }
    }
}
