//! Channel abstraction for task result streaming.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::Result;

/// Frame the client sends to ask the backend to cancel the task.
pub const CANCEL_SIGNAL: &str = "";

/// An open duplex channel bound to one task.
///
/// Frames are JSON text. `receive` must be cancel-safe: the task manager
/// races it against cancellation and the task deadline.
///
/// # Examples
///
/// ```rust,no_run
/// use flowsync::shared::{ChannelConnector, TaskChannel};
///
/// # async fn example(connector: &dyn ChannelConnector) -> flowsync::Result<()> {
/// let mut channel = connector.open("task-1").await?;
/// while let Some(frame) = channel.receive().await? {
///     println!("{frame}");
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait TaskChannel: Send + Debug {
    /// Sends a text frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Waits for the next text frame; `None` once the peer closed the channel.
    async fn receive(&mut self) -> Result<Option<String>>;

    /// Closes the channel from this side.
    async fn close(&mut self) -> Result<()>;

    /// Whether the channel is still open.
    fn is_connected(&self) -> bool;

    /// Short transport name for logs.
    fn transport_type(&self) -> &'static str;
}

/// Opens task channels.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Opens the channel of `task_id`.
    async fn open(&self, task_id: &str) -> Result<Box<dyn TaskChannel>>;
}
