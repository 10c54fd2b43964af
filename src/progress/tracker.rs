use super::update::{AnalysisStatus, ProgressUpdate};
use super::view::{ConnectionState, ProgressView};
use crate::channel::{ChannelConnector, ChannelError, ChannelEvent, ProgressChannel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify};

/// Reason passed to `on_error` when the server reports a failed job
pub const JOB_FAILED_MESSAGE: &str = "Analysis failed";

const PEER_CLOSED_MESSAGE: &str = "Connection closed by server";

type CompleteCallback = Box<dyn FnMut() + Send>;
type ErrorCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Failed,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Session id is empty")]
    EmptySessionId,

    #[error("Progress channel unavailable: {0}")]
    Channel(#[from] ChannelError),
}

impl TrackerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::EmptySessionId => false,
            TrackerError::Channel(e) => e.is_retryable(),
        }
    }
}

/// Requests teardown of a running tracker from another task
#[derive(Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clear a previous stop request so the handle can be reused
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}

enum Wait {
    Event(Option<ChannelEvent>),
    Idle(Duration),
    Stop,
}

/// Follows one analysis session over its progress channel.
///
/// Owns at most one live channel. The terminal outcome is set once and never
/// cleared: after `completed` or `failed` every further message is ignored, so
/// `on_complete` and the job-failure `on_error` fire at most once.
pub struct AnalysisProgressTracker {
    session_id: String,
    connection_state: ConnectionState,
    last_update: Option<ProgressUpdate>,
    outcome: Option<TerminalOutcome>,
    connection_error_reported: bool,
    channel: Option<Box<dyn ProgressChannel>>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    idle_timeout: Option<Duration>,
    stop: StopHandle,
    view_tx: watch::Sender<ProgressView>,
}

impl AnalysisProgressTracker {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let (view_tx, _) = watch::channel(ProgressView::build(
            &session_id,
            ConnectionState::Disconnected,
            None,
        ));

        Self {
            session_id,
            connection_state: ConnectionState::Disconnected,
            last_update: None,
            outcome: None,
            connection_error_reported: false,
            channel: None,
            on_complete: None,
            on_error: None,
            idle_timeout: None,
            stop: StopHandle::default(),
            view_tx,
        }
    }

    pub fn on_complete(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Treat silence longer than `limit` as a connection error
    pub fn with_idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle_timeout = limit.filter(|d| !d.is_zero());
        self
    }

    /// Share a stop handle, e.g. one owned by a supervising watcher
    pub fn with_stop_handle(mut self, handle: StopHandle) -> Self {
        self.stop = handle;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn last_update(&self) -> Option<&ProgressUpdate> {
        self.last_update.as_ref()
    }

    pub fn outcome(&self) -> Option<TerminalOutcome> {
        self.outcome
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_some()
    }

    pub fn view(&self) -> ProgressView {
        ProgressView::build(
            &self.session_id,
            self.connection_state,
            self.last_update.as_ref(),
        )
    }

    /// Receive a fresh view after every state change
    pub fn subscribe(&self) -> watch::Receiver<ProgressView> {
        self.view_tx.subscribe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Open the channel for this session, closing any previous one first.
    ///
    /// Failures are reported through `on_error` and also returned; there is
    /// no automatic retry.
    pub async fn activate(&mut self, connector: &dyn ChannelConnector) -> Result<(), TrackerError> {
        self.close_channel().await;

        if self.outcome.is_some() {
            tracing::debug!(
                "Session {} already finished, not reopening channel",
                self.session_id
            );
            self.set_connection_state(ConnectionState::Disconnected);
            return Ok(());
        }

        self.connection_error_reported = false;

        if self.session_id.trim().is_empty() {
            let err = TrackerError::EmptySessionId;
            self.set_connection_state(ConnectionState::Disconnected);
            self.report_connection_error(&err.to_string());
            return Err(err);
        }

        self.set_connection_state(ConnectionState::Connecting);

        match connector.open(&self.session_id).await {
            Ok(channel) => {
                tracing::info!(
                    "Tracking session {} over {}",
                    self.session_id,
                    connector.name()
                );
                self.channel = Some(channel);
                self.set_connection_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                let err = TrackerError::from(e);
                self.set_connection_state(ConnectionState::Disconnected);
                self.report_connection_error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Pump channel events until a terminal outcome, a connection loss, or a
    /// stop request. Returns the terminal outcome if one was reached.
    pub async fn run(&mut self) -> Option<TerminalOutcome> {
        let stop = self.stop.clone();

        loop {
            if self.stop.is_stop_requested() {
                self.stop().await;
                break;
            }

            let idle_timeout = self.idle_timeout;
            let Some(channel) = self.channel.as_mut() else {
                break;
            };

            let wait = tokio::select! {
                _ = stop.stopped() => Wait::Stop,
                wait = next_event(channel, idle_timeout) => wait,
            };

            match wait {
                Wait::Stop => continue,
                Wait::Event(Some(event)) => self.handle_event(event).await,
                Wait::Event(None) => self.handle_peer_closed().await,
                Wait::Idle(limit) => {
                    let reason = format!("No progress received for {}s", limit.as_secs());
                    self.handle_event(ChannelEvent::Error(reason)).await;
                }
            }
        }

        self.outcome
    }

    /// Apply one channel event. Handling runs to completion before the next
    /// event is read.
    pub async fn handle_event(&mut self, event: ChannelEvent) {
        let close = match event {
            ChannelEvent::Message(raw) => self.apply_message(&raw),
            ChannelEvent::Error(reason) => self.apply_transport_error(&reason),
        };

        if close {
            self.close_channel().await;
            self.set_connection_state(ConnectionState::Disconnected);
        } else {
            self.publish();
        }
    }

    /// Close the channel. Safe to call repeatedly; never invokes callbacks.
    pub async fn stop(&mut self) {
        if self.channel.is_none() && self.connection_state == ConnectionState::Disconnected {
            return;
        }

        tracing::info!("Stopping tracker for session {}", self.session_id);
        self.close_channel().await;
        self.set_connection_state(ConnectionState::Disconnected);
    }

    async fn handle_peer_closed(&mut self) {
        if self.outcome.is_none() {
            self.handle_event(ChannelEvent::Error(PEER_CLOSED_MESSAGE.to_string()))
                .await;
            return;
        }

        self.close_channel().await;
        self.set_connection_state(ConnectionState::Disconnected);
    }

    /// Returns true when the channel should be closed
    fn apply_message(&mut self, raw: &str) -> bool {
        if self.outcome.is_some() {
            tracing::debug!(
                "Session {} already finished, ignoring message",
                self.session_id
            );
            return false;
        }

        let Some(update) = ProgressUpdate::from_json(raw) else {
            tracing::warn!(
                "Ignoring malformed progress message for session {}: {}",
                self.session_id,
                truncate(raw, 200)
            );
            return false;
        };

        let status = update.status;
        tracing::debug!(
            "Session {}: {:?} {}% stage={:?}",
            self.session_id,
            status,
            update.progress_percent,
            update.current_stage
        );
        self.last_update = Some(update);

        match status {
            AnalysisStatus::Completed => {
                self.outcome = Some(TerminalOutcome::Completed);
                tracing::info!("Analysis {} completed", self.session_id);
                if let Some(callback) = self.on_complete.as_mut() {
                    callback();
                }
                true
            }
            AnalysisStatus::Failed => {
                self.outcome = Some(TerminalOutcome::Failed);
                tracing::warn!(
                    "Analysis {} failed: {}",
                    self.session_id,
                    self.last_update
                        .as_ref()
                        .and_then(|u| u.error.as_deref())
                        .unwrap_or("no detail")
                );
                if let Some(callback) = self.on_error.as_mut() {
                    callback(JOB_FAILED_MESSAGE);
                }
                true
            }
            AnalysisStatus::Pending | AnalysisStatus::Running => false,
        }
    }

    fn apply_transport_error(&mut self, reason: &str) -> bool {
        if self.outcome.is_some() {
            tracing::debug!(
                "Session {} transport error after finish: {}",
                self.session_id,
                reason
            );
        } else {
            self.report_connection_error(reason);
        }
        true
    }

    fn report_connection_error(&mut self, reason: &str) {
        if self.connection_error_reported {
            tracing::debug!("Suppressing repeated connection error: {}", reason);
            return;
        }
        self.connection_error_reported = true;

        tracing::warn!(
            "Progress channel error for session {}: {}",
            self.session_id,
            reason
        );
        if let Some(callback) = self.on_error.as_mut() {
            callback(reason);
        }
    }

    async fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
            tracing::debug!("Progress channel closed for session {}", self.session_id);
        }
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }
}

async fn next_event(channel: &mut Box<dyn ProgressChannel>, idle_timeout: Option<Duration>) -> Wait {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, channel.next_event()).await {
            Ok(event) => Wait::Event(event),
            Err(_) => Wait::Idle(limit),
        },
        None => Wait::Event(channel.next_event().await),
    }
}

fn truncate(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}
