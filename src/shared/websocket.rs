//! WebSocket task channel over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::transport::{ChannelConnector, TaskChannel};
use crate::client::AuthProvider;
use crate::error::{Result, TransportError};

/// Opens `{ws_url}/tasks/{task_id}` channels.
///
/// Browsers cannot set headers on WebSocket upgrades, so the backend expects
/// the access token as a `token` query parameter; this connector follows the
/// same convention.
#[derive(Clone)]
pub struct WebSocketConnector {
    base_url: Url,
    auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnector")
            .field("base_url", &self.base_url)
            .field("auth_provider", &self.auth_provider.is_some())
            .finish()
    }
}

impl WebSocketConnector {
    /// Creates a connector for the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url).map_err(TransportError::from)?,
            auth_provider: None,
        })
    }

    /// Attaches a token provider.
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// URL of the channel for `task_id`.
    pub fn task_url(&self, task_id: &str, token: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["tasks", task_id]);
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn open(&self, task_id: &str) -> Result<Box<dyn TaskChannel>> {
        let token = match &self.auth_provider {
            Some(provider) => provider.access_token().await?,
            None => None,
        };
        let url = self.task_url(task_id, token.as_deref())?;
        tracing::debug!(task_id, "opening task websocket");

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;

        Ok(Box::new(WebSocketChannel {
            stream,
            connected: true,
        }))
    }
}

/// An open task WebSocket.
pub struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connected: bool,
}

impl fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskChannel for WebSocketChannel {
    async fn send(&mut self, frame: String) -> Result<()> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed.into());
        }
        self.stream
            .send(Message::text(frame))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()).into())
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec()).map(Some).map_err(|e| {
                        TransportError::InvalidMessage(format!("non-utf8 frame: {e}")).into()
                    });
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.connected = false;
                    return Ok(None);
                },
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(TransportError::WebSocket(e.to_string()).into());
                },
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()).into())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn transport_type(&self) -> &'static str {
        "websocket"
    }
}
