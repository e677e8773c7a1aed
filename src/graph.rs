//! Editor-side graph and its mapping to and from the wire workflow.
//!
//! The editor keeps nodes in a canvas-oriented shape: node results live in a
//! nested [`NodeData`] block and edges use `source`/`target` with port
//! handles. [`to_wire`] and [`from_wire`] convert between that shape and
//! [`Workflow`]. Neither validates structure; dangling edge endpoints are the
//! editor's concern.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

use crate::types::{DataRef, Edge, Node, NodeType, Position, ProjNodeError, Workflow};

/// Results and parameters attached to an editor node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Kind-specific parameters.
    #[serde(default)]
    pub param: Map<String, Value>,
    /// Duration of the last execution, in seconds.
    #[serde(default)]
    pub runtime: Option<f64>,
    /// Output schemas.
    #[serde(default)]
    pub schema_out: Option<IndexMap<String, Value>>,
    /// Output data handles.
    #[serde(default)]
    pub data_out: Option<IndexMap<String, DataRef>>,
    /// Error of the last run.
    #[serde(default)]
    pub error: Option<ProjNodeError>,
}

/// Node as the editor holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorNode {
    /// Node id.
    pub id: String,
    /// Node kind; never changes after creation.
    #[serde(rename = "type")]
    pub kind: NodeType,
    /// Canvas position.
    pub position: Position,
    /// Parameters and results.
    #[serde(default)]
    pub data: NodeData,
}

impl EditorNode {
    /// Creates a node with empty data.
    pub fn new(id: impl Into<String>, kind: NodeType, position: Position) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            data: NodeData::default(),
        }
    }
}

/// Edge as the editor holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorEdge {
    /// Edge id.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Source output port.
    pub source_handle: String,
    /// Target node id.
    pub target: String,
    /// Target input port.
    pub target_handle: String,
}

/// The live, editable graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditableGraph {
    /// Nodes in canvas order.
    #[serde(default)]
    pub nodes: Vec<EditorNode>,
    /// Edges in canvas order.
    #[serde(default)]
    pub edges: Vec<EditorEdge>,
    /// Workflow-level error of the last run.
    #[serde(default)]
    pub error: Option<String>,
}

impl EditableGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a node up by id.
    pub fn node(&self, id: &str) -> Option<&EditorNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Looks a node up by id, mutably.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut EditorNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Removes a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<EditorNode> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Some(self.nodes.remove(index))
    }

    /// Every result handle referenced by a node's outputs.
    pub fn data_refs(&self) -> BTreeSet<&DataRef> {
        self.nodes
            .iter()
            .filter_map(|n| n.data.data_out.as_ref())
            .flat_map(|outputs| outputs.values())
            .collect()
    }

    /// Clears the error shown on a node, returning it.
    ///
    /// Called by the editor when a node's parameters change.
    pub fn clear_node_error(&mut self, id: &str) -> Option<ProjNodeError> {
        self.node_mut(id).and_then(|n| n.data.error.take())
    }

    /// Clears errors on both endpoints of an edge that was added or removed.
    pub fn clear_errors_touching(&mut self, edge: &EditorEdge) {
        self.clear_node_error(&edge.source);
        self.clear_node_error(&edge.target);
    }
}

/// Converts the editor graph into its wire workflow.
///
/// # Examples
///
/// ```
/// use flowsync::graph::{to_wire, EditableGraph, EditorNode};
/// use flowsync::types::{NodeType, Position};
///
/// let mut graph = EditableGraph::new();
/// graph.nodes.push(EditorNode::new("a", NodeType::ConstInt, Position::default()));
/// let wire = to_wire(&graph);
/// assert_eq!(wire.nodes[0].id, "a");
/// ```
pub fn to_wire(graph: &EditableGraph) -> Workflow {
    Workflow {
        nodes: graph.nodes.iter().map(node_to_wire).collect(),
        edges: graph.edges.iter().map(edge_to_wire).collect(),
        error: graph.error.clone(),
    }
}

/// Writes a wire workflow into a live editor graph.
///
/// Nodes whose id already exists in `target` are updated in place; new ids
/// are appended and ids missing from `workflow` are dropped. The final order
/// follows `workflow`. Edges are replaced wholesale.
pub fn from_wire(workflow: &Workflow, target: &mut EditableGraph) {
    let mut existing: HashMap<String, EditorNode> = target
        .nodes
        .drain(..)
        .map(|n| (n.id.clone(), n))
        .collect();

    target.nodes = workflow
        .nodes
        .iter()
        .map(|wire| match existing.remove(&wire.id) {
            Some(mut node) => {
                apply_wire_node(wire, &mut node);
                node
            },
            None => {
                let mut node = EditorNode::new(wire.id.clone(), wire.node_type, wire.position);
                apply_wire_node(wire, &mut node);
                node
            },
        })
        .collect();

    target.edges = workflow.edges.iter().map(edge_from_wire).collect();
    target.error = workflow.error.clone();
}

fn node_to_wire(node: &EditorNode) -> Node {
    Node {
        id: node.id.clone(),
        node_type: node.kind,
        position: node.position,
        param: node.data.param.clone(),
        runtime: node.data.runtime,
        schema_out: node.data.schema_out.clone(),
        data_out: node.data.data_out.clone(),
        error: node.data.error.clone(),
    }
}

fn apply_wire_node(wire: &Node, node: &mut EditorNode) {
    if node.kind != wire.node_type {
        tracing::warn!(
            node_id = %wire.id,
            editor = %node.kind,
            wire = %wire.node_type,
            "node kind differs between editor and wire, keeping the editor kind"
        );
    }
    node.position = wire.position;
    node.data = NodeData {
        param: wire.param.clone(),
        runtime: wire.runtime,
        schema_out: wire.schema_out.clone(),
        data_out: wire.data_out.clone(),
        error: wire.error.clone(),
    };
}

fn edge_to_wire(edge: &EditorEdge) -> Edge {
    Edge {
        id: edge.id.clone(),
        src: edge.source.clone(),
        src_port: edge.source_handle.clone(),
        tar: edge.target.clone(),
        tar_port: edge.target_handle.clone(),
    }
}

fn edge_from_wire(edge: &Edge) -> EditorEdge {
    EditorEdge {
        id: edge.id.clone(),
        source: edge.src.clone(),
        source_handle: edge.src_port.clone(),
        target: edge.tar.clone(),
        target_handle: edge.tar_port.clone(),
    }
}
