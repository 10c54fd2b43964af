// src/channel/websocket.rs
// WebSocket progress channel (one socket per analysis session)

use super::{ChannelConnector, ChannelError, ChannelEvent, ProgressChannel};
use crate::config::ClientConfig;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SESSION_PATH: [&str; 2] = ["ws", "analysis"];

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketConnector {
    base_url: Url,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ChannelError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ChannelError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if !matches!(base_url.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                base_url.scheme()
            )));
        }
        if base_url.cannot_be_a_base() {
            return Err(ChannelError::InvalidUrl(base_url.to_string()));
        }

        tracing::info!("WebSocket connector initialized: {}", base_url);

        Ok(Self {
            base_url,
            connect_timeout,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ChannelError> {
        let base = config
            .effective_ws_base_url()
            .ok_or_else(|| ChannelError::InvalidUrl("no WebSocket base URL configured".to_string()))?;
        Self::new(&base, config.connect_timeout())
    }

    /// Build `{base}/ws/analysis/{session_id}` with the id percent-encoded
    pub fn session_url(&self, session_id: &str) -> Result<Url, ChannelError> {
        if session_id.trim().is_empty() {
            return Err(ChannelError::EmptySessionId);
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChannelError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(SESSION_PATH)
            .push(session_id);
        Ok(url)
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn open(&self, session_id: &str) -> Result<Box<dyn ProgressChannel>, ChannelError> {
        let url = self.session_url(session_id)?;

        tracing::info!("Opening progress channel: {}", url);

        match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((socket, response))) => {
                tracing::debug!(
                    "Progress channel open for session {} (HTTP {})",
                    session_id,
                    response.status()
                );
                Ok(Box::new(WebSocketChannel {
                    socket: Some(socket),
                }))
            }
            Ok(Err(e)) => {
                tracing::warn!("Progress channel failed for session {}: {}", session_id, e);
                Err(ChannelError::ConnectionFailed(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    "Progress channel for session {} timed out after {:?}",
                    session_id,
                    self.connect_timeout
                );
                Err(ChannelError::ConnectTimeout(self.connect_timeout))
            }
        }
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

pub struct WebSocketChannel {
    socket: Option<Socket>,
}

#[async_trait]
impl ProgressChannel for WebSocketChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let socket = self.socket.as_mut()?;

            match socket.next().await {
                Some(Ok(Message::Text(text))) => return Some(ChannelEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(ChannelEvent::Message(text)),
                    Err(_) => {
                        tracing::warn!("Dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Progress channel closed by server: {:?}", frame);
                    // Flush the queued close reply to finish the handshake
                    if let Err(e) = socket.close(None).await {
                        tracing::debug!("Progress channel close reply: {}", e);
                    }
                    self.socket = None;
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.socket = None;
                    return Some(ChannelEvent::Error(e.to_string()));
                }
                None => {
                    self.socket = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                tracing::debug!("Progress channel close: {}", e);
            }
        }
    }
}
