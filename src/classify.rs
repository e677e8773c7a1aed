//! User-facing classification of failures.
//!
//! [`classify_error`] turns an [`Error`] into the message shown in a global
//! notification, depending on the [`Operation`] that failed. Node-level
//! errors reported by the backend take the other path: [`NodeErrorView`]
//! routes them to per-node UI state.
//!
//! Classification is a total match and never fails. Cancellation is not a
//! failure and classifies to `None`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::Error;
use crate::types::ProjNodeError;

/// Fallback message for transport failures.
pub const CONNECTIVITY_MESSAGE: &str = "Unable to reach the server, check your connection";

/// Operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Signing in.
    Login,
    /// Creating an account.
    Signup,
    /// Uploading a file for a node.
    FileUpload,
    /// Fetching file content.
    FileFetch,
    /// Deleting a file.
    FileDelete,
    /// Loading a project.
    ProjectFetch,
    /// Creating a project.
    ProjectCreate,
    /// Deleting a project.
    ProjectDelete,
    /// Renaming a project.
    ProjectRename,
    /// Submitting and streaming a sync.
    Sync,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "login",
            Self::Signup => "signup",
            Self::FileUpload => "file upload",
            Self::FileFetch => "file fetch",
            Self::FileDelete => "file delete",
            Self::ProjectFetch => "project fetch",
            Self::ProjectCreate => "project create",
            Self::ProjectDelete => "project delete",
            Self::ProjectRename => "project rename",
            Self::Sync => "sync",
        };
        f.write_str(name)
    }
}

impl Operation {
    /// Message for `status` on this operation.
    ///
    /// Unknown codes fall back to `"Unknown error, status N"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowsync::classify::Operation;
    ///
    /// assert_eq!(Operation::Login.status_message(401), "Invalid credentials");
    /// assert_eq!(Operation::FileDelete.status_message(500), "Internal server error");
    /// assert_eq!(Operation::Sync.status_message(418), "Unknown error, status 418");
    /// ```
    pub fn status_message(&self, status: u16) -> String {
        let known = match (self, status) {
            (_, 500) => Some("Internal server error"),

            (Self::Login, 401) => Some("Invalid credentials"),
            (Self::Login, 404) => Some("User not found"),
            (Self::Signup, 409) => Some("Username already taken"),
            (Self::Login | Self::Signup, 422) => Some("Invalid username or password format"),
            (_, 401) => Some("Session expired, please log in again"),

            (Self::FileUpload, 404) => Some("Project or node not found"),
            (Self::FileUpload, 413) => Some("File too large"),
            (Self::FileUpload, 415) => Some("Unsupported file type"),
            (Self::FileFetch | Self::FileDelete, 404) => Some("File not found"),

            (Self::ProjectFetch | Self::ProjectDelete | Self::ProjectRename, 404) => {
                Some("Project not found")
            },
            (Self::ProjectCreate | Self::ProjectRename, 409) => {
                Some("A project with this name already exists")
            },
            (Self::ProjectCreate | Self::ProjectRename, 422) => Some("Invalid project name"),

            (Self::Sync, 404) => Some("Project not found"),
            (Self::Sync, 422) => Some("Workflow could not be processed"),

            (_, 403) => Some("Permission denied"),
            _ => None,
        };

        match known {
            Some(message) => message.to_string(),
            None => format!("Unknown error, status {status}"),
        }
    }
}

/// Maps an error to a user-facing message.
///
/// Returns `None` for [`Error::TaskCancelled`], which is never surfaced.
///
/// # Examples
///
/// ```
/// use flowsync::classify::{classify_error, Operation};
/// use flowsync::Error;
///
/// let err = Error::api(401, "");
/// assert_eq!(classify_error(Operation::Login, &err).as_deref(), Some("Invalid credentials"));
///
/// let cancelled = Error::TaskCancelled { task_id: "t".into() };
/// assert_eq!(classify_error(Operation::Sync, &cancelled), None);
/// ```
pub fn classify_error(operation: Operation, error: &Error) -> Option<String> {
    match error {
        Error::TaskCancelled { .. } => None,
        Error::Api { status, .. } => Some(operation.status_message(*status)),
        Error::Transport(_) => Some(CONNECTIVITY_MESSAGE.to_string()),
        Error::Serialization(_) => Some("Unexpected response from the server".to_string()),
        Error::TaskActive { .. } => Some("Another sync is still running".to_string()),
        Error::Thumbnail(reason) => Some(format!("Thumbnail capture failed: {reason}")),
        Error::Config(reason) => Some(format!("Invalid configuration: {reason}")),
        Error::Patch(_) | Error::InvalidTransition { .. } => {
            Some(format!("Unexpected error during {operation}: {error}"))
        },
    }
}

/// How a node error is displayed on its node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeErrorView {
    /// Input ports drawn in red.
    pub red_ports: BTreeSet<String>,
    /// Messages attached to a red port.
    pub port_messages: BTreeMap<String, Vec<String>>,
    /// Whether the parameter panel shows an error flag.
    pub param_error: bool,
    /// Node-level message, if any.
    pub message: Option<String>,
}

impl NodeErrorView {
    /// Whether nothing needs to be displayed.
    pub fn is_empty(&self) -> bool {
        self.red_ports.is_empty() && !self.param_error && self.message.is_none()
    }
}

impl From<&ProjNodeError> for NodeErrorView {
    /// Validation messages prefixed with `"<port>: "` attach to that port;
    /// the rest become the node-level message.
    fn from(error: &ProjNodeError) -> Self {
        match error {
            ProjNodeError::Validation { ports, messages } => {
                let mut port_messages: BTreeMap<String, Vec<String>> = BTreeMap::new();
                let mut general = Vec::new();
                for message in messages {
                    let port = message
                        .split_once(':')
                        .map(|(port, _)| port.trim())
                        .filter(|port| ports.contains(*port));
                    match port {
                        Some(port) => port_messages
                            .entry(port.to_string())
                            .or_default()
                            .push(message.clone()),
                        None => general.push(message.clone()),
                    }
                }
                Self {
                    red_ports: ports.clone(),
                    port_messages,
                    param_error: false,
                    message: join(&general),
                }
            },
            ProjNodeError::Param { messages } => Self {
                param_error: true,
                message: join(messages),
                ..Self::default()
            },
            ProjNodeError::Execution { messages } => Self {
                message: Some(join(messages).unwrap_or_else(|| "Execution failed".to_string())),
                ..Self::default()
            },
        }
    }
}

fn join(messages: &[String]) -> Option<String> {
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("\n"))
    }
}
