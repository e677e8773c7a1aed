//! Applying streamed patch operations to a project.
//!
//! Paths are parsed into a closed [`PatchTarget`] before anything is
//! written. Paths outside the known project schema are rejected instead of
//! creating arbitrary fields.
//!
//! Accepted shapes:
//!
//! ```text
//! workflow.error
//! workflow.nodes.<sel>
//! workflow.nodes.<sel>.{position | param | runtime | schema_out | data_out | error}
//! workflow.nodes.<sel>.{param | schema_out | data_out}.<key>
//! ```
//!
//! `<sel>` is a node index or a node id. A `null` value clears optional
//! fields and removes map entries.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

use crate::error::PatchError;
use crate::types::{render_path, DataRef, Node, PatchOp, PathSegment, Project};

/// How a path addresses a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelector {
    /// Position in `workflow.nodes`.
    Index(usize),
    /// Node id.
    Id(String),
}

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// Whole-value node fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    /// `position`
    Position,
    /// `param`
    Param,
    /// `runtime`
    Runtime,
    /// `schema_out`
    SchemaOut,
    /// `data_out`
    DataOut,
    /// `error`
    Error,
}

/// Node fields that hold keyed maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapField {
    /// `param.<key>`
    Param,
    /// `schema_out.<key>`
    SchemaOut,
    /// `data_out.<key>`
    DataOut,
}

/// Validated destination of a patch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchTarget {
    /// `workflow.error`
    WorkflowError,
    /// A whole node.
    Node(NodeSelector),
    /// One field of a node.
    NodeField(NodeSelector, NodeField),
    /// One entry of a node's map field.
    NodeEntry(NodeSelector, MapField, String),
}

impl PatchTarget {
    /// Parses a path.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowsync::task::{MapField, NodeSelector, PatchTarget};
    /// use flowsync::types::PathSegment;
    ///
    /// let path = [
    ///     PathSegment::from("workflow"),
    ///     PathSegment::from("nodes"),
    ///     PathSegment::from(1usize),
    ///     PathSegment::from("schema_out"),
    ///     PathSegment::from("out"),
    /// ];
    /// assert_eq!(
    ///     PatchTarget::parse(&path).unwrap(),
    ///     PatchTarget::NodeEntry(NodeSelector::Index(1), MapField::SchemaOut, "out".into()),
    /// );
    ///
    /// let bad = [PathSegment::from("workflow"), PathSegment::from("colour")];
    /// assert!(PatchTarget::parse(&bad).is_err());
    /// ```
    pub fn parse(path: &[PathSegment]) -> Result<Self, PatchError> {
        let unknown = || PatchError::UnknownPath {
            path: render_path(path),
        };
        let immutable = || PatchError::Immutable {
            path: render_path(path),
        };

        let rest = match path {
            [PathSegment::Key(root), rest @ ..] if root == "workflow" => rest,
            _ => return Err(unknown()),
        };

        match rest {
            [PathSegment::Key(field)] if field == "error" => Ok(Self::WorkflowError),
            [PathSegment::Key(nodes), selector, node_path @ ..] if nodes == "nodes" => {
                let selector = match selector {
                    PathSegment::Index(i) => NodeSelector::Index(*i),
                    PathSegment::Key(id) => NodeSelector::Id(id.clone()),
                };
                match node_path {
                    [] => Ok(Self::Node(selector)),
                    [PathSegment::Key(field)] => {
                        let field = match field.as_str() {
                            "position" => NodeField::Position,
                            "param" => NodeField::Param,
                            "runtime" => NodeField::Runtime,
                            "schema_out" => NodeField::SchemaOut,
                            "data_out" => NodeField::DataOut,
                            "error" => NodeField::Error,
                            "id" | "type" => return Err(immutable()),
                            _ => return Err(unknown()),
                        };
                        Ok(Self::NodeField(selector, field))
                    },
                    [PathSegment::Key(field), key] => {
                        let field = match field.as_str() {
                            "param" => MapField::Param,
                            "schema_out" => MapField::SchemaOut,
                            "data_out" => MapField::DataOut,
                            _ => return Err(unknown()),
                        };
                        Ok(Self::NodeEntry(selector, field, key.to_string()))
                    },
                    _ => Err(unknown()),
                }
            },
            _ => Err(unknown()),
        }
    }
}

/// Applies one operation to `project`.
///
/// On error the project is left untouched.
pub fn apply_op(project: &mut Project, op: &PatchOp) -> Result<(), PatchError> {
    let path = || render_path(&op.key);

    match PatchTarget::parse(&op.key)? {
        PatchTarget::WorkflowError => {
            project.workflow.error = decode(&op.value, path)?;
        },
        PatchTarget::Node(selector) => {
            let replacement: Node = decode(&op.value, path)?;
            let node = select(project, &selector)?;
            if replacement.id != node.id || replacement.node_type != node.node_type {
                return Err(PatchError::Immutable { path: path() });
            }
            *node = replacement;
        },
        PatchTarget::NodeField(selector, field) => {
            let node = select(project, &selector)?;
            match field {
                NodeField::Position => node.position = decode(&op.value, path)?,
                NodeField::Param => {
                    node.param = decode::<Option<_>>(&op.value, path)?.unwrap_or_default();
                },
                NodeField::Runtime => node.runtime = decode(&op.value, path)?,
                NodeField::SchemaOut => node.schema_out = decode(&op.value, path)?,
                NodeField::DataOut => node.data_out = decode(&op.value, path)?,
                NodeField::Error => node.error = decode(&op.value, path)?,
            }
        },
        PatchTarget::NodeEntry(selector, field, key) => {
            let node = select(project, &selector)?;
            set_entry(node, field, key, &op.value, path)?;
        },
    }
    Ok(())
}

fn set_entry(
    node: &mut Node,
    field: MapField,
    key: String,
    value: &Value,
    path: impl Fn() -> String,
) -> Result<(), PatchError> {
    match field {
        MapField::Param => {
            if value.is_null() {
                node.param.remove(&key);
            } else {
                node.param.insert(key, value.clone());
            }
        },
        MapField::SchemaOut => {
            if value.is_null() {
                if let Some(map) = node.schema_out.as_mut() {
                    map.shift_remove(&key);
                }
            } else {
                node.schema_out
                    .get_or_insert_with(Default::default)
                    .insert(key, value.clone());
            }
        },
        MapField::DataOut => {
            if value.is_null() {
                if let Some(map) = node.data_out.as_mut() {
                    map.shift_remove(&key);
                }
            } else {
                let data: DataRef = decode(value, path)?;
                node.data_out
                    .get_or_insert_with(Default::default)
                    .insert(key, data);
            }
        },
    }
    Ok(())
}

/// Applies every operation in order, skipping rejected ones.
///
/// Returns the rejected operations' errors.
pub fn apply_all<'a, I>(project: &mut Project, ops: I) -> Vec<PatchError>
where
    I: IntoIterator<Item = &'a PatchOp>,
{
    let mut rejected = Vec::new();
    for op in ops {
        if let Err(err) = apply_op(project, op) {
            tracing::warn!(error = %err, "rejected patch operation");
            rejected.push(err);
        }
    }
    rejected
}

fn select<'a>(project: &'a mut Project, selector: &NodeSelector) -> Result<&'a mut Node, PatchError> {
    let nodes = &mut project.workflow.nodes;
    let found = match selector {
        NodeSelector::Index(i) => nodes.get_mut(*i),
        NodeSelector::Id(id) => nodes.iter_mut().find(|n| &n.id == id),
    };
    found.ok_or_else(|| PatchError::NodeNotFound {
        node: selector.to_string(),
    })
}

fn decode<T: DeserializeOwned>(value: &Value, path: impl Fn() -> String) -> Result<T, PatchError> {
    serde_json::from_value(value.clone()).map_err(|e| PatchError::InvalidValue {
        path: path(),
        message: e.to_string(),
    })
}
