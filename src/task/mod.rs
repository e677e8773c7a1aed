//! Task lifecycle: state machine, timer events, patch application and the
//! single-slot monitor.

pub mod manager;
pub mod patch;
pub mod state;
pub mod timer;

pub use manager::{SharedProject, TaskManager, TaskReport};
pub use patch::{apply_all, apply_op, MapField, NodeField, NodeSelector, PatchTarget};
pub use state::TaskState;
pub use timer::{
    RunningNodes, SubscriptionId, TimerBus, TimerEvent, TimerEventKind, TimerListener,
};
