// src/channel/memory.rs
// In-memory progress channel, fed from the same process

use super::{ChannelConnector, ChannelError, ChannelEvent, ProgressChannel};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Sending half of an in-memory channel. Dropping every feed closes the channel.
#[derive(Clone)]
pub struct MemoryFeed {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    close_count: Arc<AtomicUsize>,
}

impl MemoryFeed {
    /// Push a raw message. Returns false once the channel side is closed.
    pub fn send_message(&self, payload: impl Into<String>) -> bool {
        self.tx.send(ChannelEvent::Message(payload.into())).is_ok()
    }

    /// Push a transport error
    pub fn send_error(&self, reason: impl Into<String>) -> bool {
        self.tx.send(ChannelEvent::Error(reason.into())).is_ok()
    }

    /// How many times the receiving side has been closed
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct MemoryChannel {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    close_count: Arc<AtomicUsize>,
    closed: bool,
}

impl MemoryChannel {
    /// Create a connected feed/channel pair
    pub fn pair() -> (MemoryFeed, MemoryChannel) {
        let (tx, rx) = mpsc::unbounded_channel();
        let close_count = Arc::new(AtomicUsize::new(0));
        let feed = MemoryFeed {
            tx,
            close_count: close_count.clone(),
        };
        let channel = MemoryChannel {
            rx,
            close_count,
            closed: false,
        };
        (feed, channel)
    }
}

#[async_trait]
impl ProgressChannel for MemoryChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out prepared in-memory channels in order, one per `open` call
pub struct MemoryConnector {
    channels: Mutex<VecDeque<MemoryChannel>>,
    failure: Option<String>,
    opened: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new(channel: MemoryChannel) -> Self {
        Self::with_channels(vec![channel])
    }

    pub fn with_channels(channels: Vec<MemoryChannel>) -> Self {
        Self {
            channels: Mutex::new(channels.into()),
            failure: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// A connector whose every `open` fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            channels: Mutex::new(VecDeque::new()),
            failure: Some(reason.into()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Session ids passed to `open`, in call order
    pub fn opened_sessions(&self) -> Vec<String> {
        self.opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn open(&self, session_id: &str) -> Result<Box<dyn ProgressChannel>, ChannelError> {
        if session_id.trim().is_empty() {
            return Err(ChannelError::EmptySessionId);
        }

        if let Ok(mut opened) = self.opened.lock() {
            opened.push(session_id.to_string());
        }

        if let Some(reason) = &self.failure {
            return Err(ChannelError::ConnectionFailed(reason.clone()));
        }

        let mut channels = self
            .channels
            .lock()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        match channels.pop_front() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(ChannelError::AlreadyConsumed),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
