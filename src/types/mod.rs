//! Wire and domain types shared by every component.
//!
//! - [`project`]: the serializable project, its workflow graph and node errors
//! - [`data`]: node result views and file references
//! - [`message`]: submission responses and streamed task messages

pub mod data;
pub mod message;
pub mod project;

pub use data::{DataView, FileContent, FileRef, TableView};
pub use message::{
    render_path, DecodedFrame, PatchOp, PatchPath, PathSegment, SubmitResponse, TaskMessage,
    TimerDirective,
};
pub use project::{
    DataRef, Edge, Node, NodeType, Position, ProjNodeError, Project, ProjectSummary, Workflow,
};
