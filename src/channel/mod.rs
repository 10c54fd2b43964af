// src/channel/mod.rs
// Progress Channel - real-time transports keyed by session id

mod memory;
mod types;
mod websocket;

pub use memory::{MemoryChannel, MemoryConnector, MemoryFeed};
pub use types::{ChannelError, ChannelEvent};
pub use websocket::WebSocketConnector;

use async_trait::async_trait;

/// A live duplex channel scoped to one analysis session
#[async_trait]
pub trait ProgressChannel: Send {
    /// Wait for the next event. `None` means the peer closed the channel.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&mut self);
}

/// Opens progress channels for a session id
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel scoped to `session_id`
    async fn open(&self, session_id: &str) -> Result<Box<dyn ProgressChannel>, ChannelError>;

    /// Get transport name
    fn name(&self) -> &str;
}
