//! Submission responses and streamed task messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;

use super::project::Project;
use crate::error::PatchError;

/// Answer of the submission endpoint.
///
/// The backend either runs the project synchronously and answers with the
/// final project, or starts a task and answers with its id.
///
/// # Examples
///
/// ```
/// use flowsync::types::SubmitResponse;
///
/// let resp: SubmitResponse =
///     serde_json::from_value(serde_json::json!({"task_id": "t-9"})).unwrap();
/// assert_eq!(resp.task_id(), Some("t-9"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    /// A task was started; results arrive over the streaming channel.
    Task {
        /// Backend-assigned task id.
        task_id: String,
    },
    /// The project was executed synchronously.
    Final(Box<Project>),
}

impl SubmitResponse {
    /// The task id, when a task was started.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Task { task_id } => Some(task_id),
            Self::Final(_) => None,
        }
    }
}

/// One step of a patch path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index.
    Index(usize),
    /// Object key or node id.
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Patch paths are short, so they stay inline.
pub type PatchPath = SmallVec<[PathSegment; 6]>;

/// Renders a path as `a.b.3.c`.
pub fn render_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Single deep-assignment operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// Path from the project root.
    pub key: PatchPath,
    /// New value; `null` clears optional fields.
    pub value: Value,
}

impl PatchOp {
    /// Builds an operation from path segments.
    pub fn new<I, S>(key: I, value: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Self {
            key: key.into_iter().map(Into::into).collect(),
            value,
        }
    }
}

/// Running-indicator directive for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerDirective {
    /// The node started executing.
    Start,
    /// The node finished executing.
    Stop,
}

/// Message pushed by the backend over the task channel.
///
/// # Examples
///
/// ```
/// use flowsync::types::{TaskMessage, TimerDirective};
///
/// let msg: TaskMessage = serde_json::from_str(
///     r#"{"timer": "start", "node_id": "n2"}"#,
/// ).unwrap();
/// assert_eq!(msg.timer, Some(TimerDirective::Start));
/// assert!(msg.patch.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Ordered patch operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch: Vec<PatchOp>,

    /// Timer directive for `node_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerDirective>,

    /// Node the timer directive refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// A task frame decoded one operation at a time.
///
/// Produced by [`TaskMessage::decode_frame`]. Operations and timer values
/// that do not decode are left out of `message` and reported here, so the
/// rest of the frame still applies.
#[derive(Debug)]
pub struct DecodedFrame {
    /// Everything that decoded.
    pub message: TaskMessage,
    /// Operations whose path or shape did not decode.
    pub rejected: Vec<PatchError>,
    /// Timer value that is not a known directive.
    pub invalid_timer: Option<Value>,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    patch: Vec<Value>,
    #[serde(default)]
    timer: Option<Value>,
    #[serde(default)]
    node_id: Option<Value>,
}

impl TaskMessage {
    /// Decodes a frame, isolating malformed patch operations and timer
    /// values instead of rejecting the whole frame.
    ///
    /// Fails only when the frame is not a JSON object of the expected
    /// outline.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowsync::types::{TaskMessage, TimerDirective};
    ///
    /// let frame = TaskMessage::decode_frame(
    ///     r#"{"patch": [{"key": ["workflow", "error"], "value": "x"},
    ///                   {"key": ["workflow", true], "value": 1}],
    ///         "timer": "start", "node_id": "n1"}"#,
    /// ).unwrap();
    /// assert_eq!(frame.message.patch.len(), 1);
    /// assert_eq!(frame.rejected.len(), 1);
    /// assert_eq!(frame.message.timer, Some(TimerDirective::Start));
    /// ```
    pub fn decode_frame(text: &str) -> Result<DecodedFrame, serde_json::Error> {
        let raw: RawFrame = serde_json::from_str(text)?;

        let mut patch = Vec::with_capacity(raw.patch.len());
        let mut rejected = Vec::new();
        for op in &raw.patch {
            match PatchOp::deserialize(op) {
                Ok(op) => patch.push(op),
                Err(err) => rejected.push(PatchError::Malformed {
                    path: render_raw_key(op.get("key")),
                    message: err.to_string(),
                }),
            }
        }

        let (timer, invalid_timer) = match raw.timer {
            None | Some(Value::Null) => (None, None),
            Some(value) => match TimerDirective::deserialize(&value) {
                Ok(directive) => (Some(directive), None),
                Err(_) => (None, Some(value)),
            },
        };

        let node_id = match raw.node_id {
            Some(Value::String(id)) => Some(id),
            _ => None,
        };

        Ok(DecodedFrame {
            message: TaskMessage {
                patch,
                timer,
                node_id,
            },
            rejected,
            invalid_timer,
        })
    }
}

fn render_raw_key(key: Option<&Value>) -> String {
    match key {
        Some(Value::Array(segments)) => segments
            .iter()
            .map(|segment| match segment {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("."),
        Some(other) => other.to_string(),
        None => "<no key>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_path_mixes_keys_and_indices() {
        let op: PatchOp = serde_json::from_value(json!({
            "key": ["workflow", "nodes", 2, "schema_out"],
            "value": {"out": "int"},
        }))
        .unwrap();
        assert_eq!(op.key[2], PathSegment::Index(2));
        assert_eq!(render_path(&op.key), "workflow.nodes.2.schema_out");
    }

    #[test]
    fn submit_response_final_project() {
        let project = Project::new(3, "p", 1);
        let json = serde_json::to_value(&project).unwrap();
        let resp: SubmitResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.task_id(), None);
        assert!(matches!(resp, SubmitResponse::Final(p) if p.id == 3));
    }

    #[test]
    fn malformed_ops_are_isolated() {
        let frame = TaskMessage::decode_frame(
            &json!({
                "patch": [
                    {"key": ["workflow", "nodes", "n1", "runtime"], "value": 2.5},
                    {"key": ["workflow", "nodes", true, "runtime"], "value": 1.0},
                    {"key": ["workflow", "nodes", -1], "value": null},
                    {"value": 3},
                ],
                "timer": "stop",
                "node_id": "n1",
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(frame.message.patch.len(), 1);
        assert_eq!(render_path(&frame.message.patch[0].key), "workflow.nodes.n1.runtime");
        assert_eq!(frame.message.timer, Some(TimerDirective::Stop));
        assert_eq!(frame.message.node_id.as_deref(), Some("n1"));
        assert!(frame.invalid_timer.is_none());

        let paths: Vec<String> = frame
            .rejected
            .iter()
            .map(|err| match err {
                PatchError::Malformed { path, .. } => path.clone(),
                other => panic!("unexpected rejection {other:?}"),
            })
            .collect();
        assert_eq!(paths, ["workflow.nodes.true.runtime", "workflow.nodes.-1", "<no key>"]);
    }

    #[test]
    fn unknown_timer_keeps_patches() {
        let frame = TaskMessage::decode_frame(
            r#"{"patch": [{"key": ["workflow", "error"], "value": "boom"}],
                "timer": "pause", "node_id": "n4"}"#,
        )
        .unwrap();
        assert_eq!(frame.message.patch.len(), 1);
        assert_eq!(frame.message.timer, None);
        assert_eq!(frame.invalid_timer, Some(json!("pause")));
        assert!(frame.rejected.is_empty());
    }

    #[test]
    fn non_object_frame_is_an_error() {
        assert!(TaskMessage::decode_frame("[1, 2]").is_err());
        assert!(TaskMessage::decode_frame("not json").is_err());
    }

    #[test]
    fn empty_message_decodes() {
        let msg: TaskMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(msg, TaskMessage::default());
    }
}
