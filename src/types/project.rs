//! Project wire types.
//!
//! A [`Project`] is the unit submitted to the backend. Its [`Workflow`] holds
//! the node graph in wire form; the editor-side form lives in
//! [`graph`](crate::graph).
//!
//! # Serialization
//!
//! Field names are `snake_case` on the wire. Optional node fields are omitted
//! when absent so that a freshly created node serializes without result data.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Serializable unit of work owned by one editor session.
///
/// # Examples
///
/// ```
/// use flowsync::types::Project;
///
/// let project = Project::new(7, "demo", 1);
/// let json = serde_json::to_value(&project).unwrap();
/// assert_eq!(json["id"], 7);
/// assert_eq!(json["workflow"]["nodes"].as_array().unwrap().len(), 0);
/// assert!(json.get("thumb").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Stable numeric identifier.
    pub id: i64,

    /// Display name.
    pub name: String,

    /// Owner identifier.
    pub owner: i64,

    /// Last update, stamped by every sync.
    pub updated_at: DateTime<Utc>,

    /// Encoded thumbnail (base64 PNG data URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,

    /// The graph.
    #[serde(default)]
    pub workflow: Workflow,
}

impl Project {
    /// Creates an empty project stamped with the current time.
    pub fn new(id: i64, name: impl Into<String>, owner: i64) -> Self {
        Self {
            id,
            name: name.into(),
            owner,
            updated_at: Utc::now(),
            thumb: None,
            workflow: Workflow::default(),
        }
    }

    /// Looks a node up by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.workflow.nodes.iter().find(|n| n.id == id)
    }

    /// Looks a node up by id, mutably.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.workflow.nodes.iter_mut().find(|n| n.id == id)
    }

    /// All data handles referenced by any node output.
    pub fn data_refs(&self) -> BTreeSet<&DataRef> {
        self.workflow
            .nodes
            .iter()
            .filter_map(|n| n.data_out.as_ref())
            .flat_map(|outs| outs.values())
            .collect()
    }
}

/// Listing entry returned by the project service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    /// Project id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Last update.
    pub updated_at: DateTime<Utc>,
    /// Encoded thumbnail, if one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

/// Node graph in wire form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Nodes in editor order.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Edges in editor order.
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Workflow-level error message from the last run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Closed set of node kinds.
///
/// The kind is fixed at creation; nothing in this crate changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Integer constant.
    ConstInt,
    /// Float constant.
    ConstFloat,
    /// String constant.
    ConstStr,
    /// Boolean constant.
    ConstBool,
    /// Table loaded from an uploaded file.
    TableFromFile,
    /// Row filter.
    TableFilter,
    /// Column projection.
    TableSelect,
    /// Join of two tables.
    TableJoin,
    /// Group-by aggregation.
    TableAggregate,
    /// Sort by columns.
    TableSort,
    /// Line chart.
    PlotLine,
    /// Bar chart.
    PlotBar,
    /// Scatter chart.
    PlotScatter,
}

impl NodeType {
    /// All node kinds, in declaration order.
    pub const ALL: [NodeType; 13] = [
        Self::ConstInt,
        Self::ConstFloat,
        Self::ConstStr,
        Self::ConstBool,
        Self::TableFromFile,
        Self::TableFilter,
        Self::TableSelect,
        Self::TableJoin,
        Self::TableAggregate,
        Self::TableSort,
        Self::PlotLine,
        Self::PlotBar,
        Self::PlotScatter,
    ];
}

impl NodeType {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConstInt => "const_int",
            Self::ConstFloat => "const_float",
            Self::ConstStr => "const_str",
            Self::ConstBool => "const_bool",
            Self::TableFromFile => "table_from_file",
            Self::TableFilter => "table_filter",
            Self::TableSelect => "table_select",
            Self::TableJoin => "table_join",
            Self::TableAggregate => "table_aggregate",
            Self::TableSort => "table_sort",
            Self::PlotLine => "plot_line",
            Self::PlotBar => "plot_bar",
            Self::PlotScatter => "plot_scatter",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Opaque handle to a node output stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRef(pub String);

impl DataRef {
    /// Creates a handle.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A computation node in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the project.
    pub id: String,

    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Canvas position.
    pub position: Position,

    /// Kind-specific parameters.
    #[serde(default)]
    pub param: Map<String, Value>,

    /// Duration of the last execution, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<f64>,

    /// Output port name to type descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_out: Option<IndexMap<String, Value>>,

    /// Output port name to stored result handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_out: Option<IndexMap<String, DataRef>>,

    /// Error from the last run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProjNodeError>,
}

impl Node {
    /// Creates a node with no parameters and no results.
    pub fn new(id: impl Into<String>, node_type: NodeType, position: Position) -> Self {
        Self {
            id: id.into(),
            node_type,
            position,
            param: Map::new(),
            runtime: None,
            schema_out: None,
            data_out: None,
            error: None,
        }
    }
}

/// Directed data connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id.
    pub id: String,
    /// Source node id.
    pub src: String,
    /// Source output port.
    pub src_port: String,
    /// Target node id.
    pub tar: String,
    /// Target input port.
    pub tar_port: String,
}

/// Error reported by the backend for a single node.
///
/// # Examples
///
/// ```
/// use flowsync::types::ProjNodeError;
///
/// let err: ProjNodeError = serde_json::from_value(serde_json::json!({
///     "type": "validation",
///     "ports": ["table"],
///     "messages": ["table: missing input"],
/// })).unwrap();
/// assert!(err.ports().unwrap().contains("table"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjNodeError {
    /// Inputs are missing or mistyped.
    Validation {
        /// Offending input port names.
        #[serde(default)]
        ports: BTreeSet<String>,
        /// Human-readable messages.
        #[serde(default)]
        messages: Vec<String>,
    },
    /// Parameters are invalid.
    Param {
        /// Human-readable messages.
        #[serde(default)]
        messages: Vec<String>,
    },
    /// Execution raised an error.
    Execution {
        /// Human-readable messages.
        #[serde(default)]
        messages: Vec<String>,
    },
}

impl ProjNodeError {
    /// The messages, whatever the variant.
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Validation { messages, .. }
            | Self::Param { messages }
            | Self::Execution { messages } => messages,
        }
    }

    /// Offending ports of a validation error.
    pub fn ports(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Validation { ports, .. } => Some(ports),
            _ => None,
        }
    }
}
