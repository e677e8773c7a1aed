//! Error types for the synchronization core.
//!
//! Every failure is produced as a closed [`Error`] variant at the boundary
//! where it happens (HTTP response, channel frame, patch path), so that
//! [`classify`](crate::classify) can match on a known tag set instead of
//! probing the shape of an arbitrary error object.

use thiserror::Error;

use crate::task::TaskState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// # Examples
///
/// ```
/// use flowsync::Error;
///
/// let err = Error::TaskCancelled { task_id: "t-1".to_string() };
/// assert!(err.is_cancelled());
/// assert_eq!(err.status(), None);
///
/// let err = Error::Api { status: 404, body: String::new() };
/// assert_eq!(err.status(), Some(404));
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// Network or channel failure without a structured response.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Backend answered with a non-success status code.
    #[error("api error (status {status}): {body}")]
    Api {
        /// HTTP-like status code.
        status: u16,
        /// Raw response body, possibly empty.
        body: String,
    },

    /// The task was cancelled by a superseding sync or an explicit call.
    ///
    /// This is a control-flow signal, not a failure to surface to the user.
    #[error("task {task_id} was cancelled")]
    TaskCancelled {
        /// The cancelled task.
        task_id: String,
    },

    /// A task is already being monitored; it must be cancelled first.
    #[error("task {task_id} is still active")]
    TaskActive {
        /// The task currently owning the manager.
        task_id: String,
    },

    /// Rejected task state machine transition.
    #[error("invalid task transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: TaskState,
        /// Requested state.
        to: TaskState,
    },

    /// A streamed patch operation was rejected.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Thumbnail capture failed.
    #[error("thumbnail capture failed: {0}")]
    Thumbnail(String),
}

impl Error {
    /// Returns `true` for the distinguished cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::TaskCancelled { .. })
    }

    /// Returns the status code carried by an [`Error::Api`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds an [`Error::Api`] from a status code and body.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("TOML parse error: {err}"))
    }
}

/// Transport-level failures (request, channel, framing).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or its response could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The streaming channel is already closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame could not be decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Invalid endpoint URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Reasons a streamed patch operation is rejected.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The path does not name a known field of the project schema.
    #[error("unknown patch path: {path}")]
    UnknownPath {
        /// Rendered path, e.g. `workflow.nodes.3.colour`.
        path: String,
    },

    /// The path names a node that does not exist.
    #[error("patch targets missing node {node}")]
    NodeNotFound {
        /// Node id or index as it appeared in the path.
        node: String,
    },

    /// The path names a field that never changes after creation.
    #[error("patch targets immutable field {path}")]
    Immutable {
        /// Rendered path.
        path: String,
    },

    /// The operation itself does not decode, e.g. a path segment that is
    /// neither a string nor a non-negative index.
    #[error("malformed patch operation at {path}: {message}")]
    Malformed {
        /// Path as received, rendered best-effort.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// The value does not deserialize into the targeted field.
    #[error("invalid value for {path}: {message}")]
    InvalidValue {
        /// Rendered path.
        path: String,
        /// Decoder message.
        message: String,
    },
}
