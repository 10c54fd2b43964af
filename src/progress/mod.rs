//! Real-time analysis progress: wire messages, the tracker state machine and
//! the render-ready view it produces.

pub mod stage;
pub mod tracker;
pub mod update;
pub mod view;

pub use stage::{stage_label, StageColor};
pub use tracker::{
    AnalysisProgressTracker, StopHandle, TerminalOutcome, TrackerError, JOB_FAILED_MESSAGE,
};
pub use update::{AnalysisStatus, ProgressUpdate};
pub use view::{ConnectionState, ProgressView, SubProgress};
