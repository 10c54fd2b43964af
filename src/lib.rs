//! Client for a media-authenticity analysis backend: submit a file, then
//! follow the analysis session's progress over a real-time channel.

pub mod channel;
pub mod config;
pub mod progress;
pub mod upload;
pub mod watcher;

pub use channel::{ChannelConnector, ChannelError, ChannelEvent, ProgressChannel, WebSocketConnector};
pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use progress::{
    AnalysisProgressTracker, AnalysisStatus, ConnectionState, ProgressUpdate, ProgressView,
    StageColor, StopHandle, TerminalOutcome, TrackerError,
};
pub use upload::{AnalysisClient, AnalysisType, SubmittedAnalysis, UploadError};
pub use watcher::retry::ReconnectPolicy;
pub use watcher::{ProgressWatcher, WatchOutcome, WatchReport};
