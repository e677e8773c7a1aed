//! In-process channel pair.
//!
//! [`MemoryConnector`] hands the client a [`TaskChannel`] and delivers the
//! matching [`ServerEnd`] through [`MemoryConnector::accept`], so tests and
//! embedded backends can play the server role without a socket.
//!
//! # Examples
//!
//! ```
//! use flowsync::shared::{ChannelConnector, MemoryConnector, TaskChannel};
//! use flowsync::types::TaskMessage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowsync::Result<()> {
//! let connector = MemoryConnector::new();
//! let mut client = connector.open("t1").await?;
//! let server = connector.accept().await.unwrap();
//! assert_eq!(server.task_id(), "t1");
//!
//! server.send(&TaskMessage::default());
//! server.close();
//! assert_eq!(client.receive().await?.as_deref(), Some("{}"));
//! assert_eq!(client.receive().await?, None);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};

use super::transport::{ChannelConnector, TaskChannel};
use crate::error::{Result, TransportError};
use crate::types::TaskMessage;

#[derive(Debug)]
enum ServerFrame {
    Text(String),
    Fail(String),
}

/// Connector producing in-process channels.
#[derive(Debug)]
pub struct MemoryConnector {
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
    accepted_rx: Mutex<mpsc::UnboundedReceiver<ServerEnd>>,
    refuse_next: AtomicBool,
}

impl MemoryConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            accepted_tx,
            accepted_rx: Mutex::new(accepted_rx),
            refuse_next: AtomicBool::new(false),
        }
    }

    /// Makes the next `open` fail with a transport error.
    pub fn refuse_next(&self) {
        self.refuse_next.store(true, Ordering::Release);
    }

    /// Waits for the server end of the next opened channel.
    pub async fn accept(&self) -> Option<ServerEnd> {
        self.accepted_rx.lock().await.recv().await
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn open(&self, task_id: &str) -> Result<Box<dyn TaskChannel>> {
        if self.refuse_next.swap(false, Ordering::AcqRel) {
            return Err(TransportError::Request(format!(
                "connection to task {task_id} refused"
            ))
            .into());
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let server = ServerEnd {
            task_id: task_id.to_string(),
            outgoing: parking_lot::Mutex::new(Some(to_client)),
            incoming: Mutex::new(from_client),
        };
        self.accepted_tx
            .send(server)
            .map_err(|_| TransportError::ConnectionClosed)?;

        Ok(Box::new(MemoryChannel {
            incoming: from_server,
            outgoing: Some(to_server),
            connected: true,
        }))
    }
}

/// Client side of an in-process channel.
#[derive(Debug)]
pub struct MemoryChannel {
    incoming: mpsc::UnboundedReceiver<ServerFrame>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    connected: bool,
}

#[async_trait]
impl TaskChannel for MemoryChannel {
    async fn send(&mut self, frame: String) -> Result<()> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        outgoing
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed.into())
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        match self.incoming.recv().await {
            Some(ServerFrame::Text(text)) => Ok(Some(text)),
            Some(ServerFrame::Fail(reason)) => {
                self.connected = false;
                Err(TransportError::Request(reason).into())
            },
            None => {
                self.connected = false;
                Ok(None)
            },
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.outgoing = None;
        self.incoming.close();
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

/// Server side of an in-process channel.
#[derive(Debug)]
pub struct ServerEnd {
    task_id: String,
    outgoing: parking_lot::Mutex<Option<mpsc::UnboundedSender<ServerFrame>>>,
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ServerEnd {
    /// Task the channel was opened for.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Pushes a message. Returns `false` if the channel is gone.
    pub fn send(&self, message: &TaskMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.send_raw(text),
            Err(_) => false,
        }
    }

    /// Pushes a raw text frame.
    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        self.push(ServerFrame::Text(text.into()))
    }

    /// Breaks the channel with a transport error on the client side.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let sent = self.push(ServerFrame::Fail(reason.into()));
        self.close();
        sent
    }

    /// Closes the channel cleanly.
    pub fn close(&self) {
        self.outgoing.lock().take();
    }

    /// Waits for the next frame sent by the client; `None` once it closed.
    pub async fn recv(&self) -> Option<String> {
        self.incoming.lock().await.recv().await
    }

    fn push(&self, frame: ServerFrame) -> bool {
        self.outgoing
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_open_is_a_transport_error() {
        let connector = MemoryConnector::new();
        connector.refuse_next();
        let err = connector.open("t").await.unwrap_err();
        assert!(matches!(err, crate::Error::Transport(_)));
        assert!(connector.open("t").await.is_ok());
    }

    #[tokio::test]
    async fn client_frames_reach_server() {
        let connector = MemoryConnector::new();
        let mut client = connector.open("t").await.unwrap();
        let server = connector.accept().await.unwrap();
        client.send(String::new()).await.unwrap();
        assert_eq!(server.recv().await.as_deref(), Some(""));
        client.close().await.unwrap();
        assert!(!client.is_connected());
        assert_eq!(server.recv().await, None);
    }

    #[tokio::test]
    async fn failure_surfaces_on_receive() {
        let connector = MemoryConnector::new();
        let mut client = connector.open("t").await.unwrap();
        let server = connector.accept().await.unwrap();
        server.fail("reset by peer");
        assert!(client.receive().await.is_err());
        assert!(!client.is_connected());
    }
}
