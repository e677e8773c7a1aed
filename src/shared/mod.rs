//! Streaming channel transports.
//!
//! A task's results arrive over a duplex channel opened per task. The
//! [`TaskChannel`] trait abstracts that channel; [`ChannelConnector`] opens
//! one for a task id.

pub mod memory;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnector, ServerEnd};
pub use transport::{ChannelConnector, TaskChannel, CANCEL_SIGNAL};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector};
