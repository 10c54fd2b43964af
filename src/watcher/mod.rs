use crate::channel::ChannelConnector;
use crate::progress::{AnalysisProgressTracker, ProgressView, StopHandle, TerminalOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use self::retry::ReconnectPolicy;

pub mod retry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Completed,
    Failed,
    Disconnected,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WatchReport {
    pub outcome: WatchOutcome,
    pub view: ProgressView,
    pub reconnects: u32,
    pub last_error: Option<String>,
}

/// Runs trackers for a session until it finishes. A tracker never reconnects
/// on its own; when a `ReconnectPolicy` is set, the watcher builds a fresh
/// tracker after each connection loss.
pub struct ProgressWatcher {
    connector: Box<dyn ChannelConnector>,
    reconnect: Option<ReconnectPolicy>,
    idle_timeout: Option<Duration>,
    stop: StopHandle,
    view_tx: watch::Sender<Option<ProgressView>>,
}

impl ProgressWatcher {
    pub fn new(connector: Box<dyn ChannelConnector>) -> Self {
        let (view_tx, _) = watch::channel(None);
        Self {
            connector,
            reconnect: None,
            idle_timeout: None,
            stop: StopHandle::default(),
            view_tx,
        }
    }

    pub fn with_reconnect(mut self, policy: Option<ReconnectPolicy>) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle_timeout = limit;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Views from whichever tracker is currently running
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressView>> {
        self.view_tx.subscribe()
    }

    /// Follow `session_id` until it finishes. A stop request ends only the
    /// current call; the watcher can be reused afterwards.
    pub async fn watch(&self, session_id: &str) -> WatchReport {
        let report = self.watch_until_done(session_id).await;
        self.stop.reset();
        report
    }

    async fn watch_until_done(&self, session_id: &str) -> WatchReport {
        let last_error: Arc<Mutex<Option<String>>> = Arc::default();
        let mut reconnects = 0u32;
        let mut attempt = 0u32;

        loop {
            let errors = last_error.clone();
            let mut tracker = AnalysisProgressTracker::new(session_id)
                .with_idle_timeout(self.idle_timeout)
                .with_stop_handle(self.stop.clone())
                .on_error(move |reason| {
                    if let Ok(mut slot) = errors.lock() {
                        *slot = Some(reason.to_string());
                    }
                });

            let retryable = match tracker.activate(self.connector.as_ref()).await {
                Ok(()) => {
                    let connected_at = Instant::now();
                    let outcome = self.run_forwarding(&mut tracker).await;
                    let uptime = connected_at.elapsed();
                    let view = tracker.view();
                    self.view_tx.send_replace(Some(view.clone()));

                    match outcome {
                        Some(TerminalOutcome::Completed) => {
                            return self.report(WatchOutcome::Completed, view, reconnects, &last_error)
                        }
                        Some(TerminalOutcome::Failed) => {
                            return self.report(WatchOutcome::Failed, view, reconnects, &last_error)
                        }
                        None if self.stop.is_stop_requested() => {
                            return self.report(WatchOutcome::Stopped, view, reconnects, &last_error)
                        }
                        None => {
                            let stable = self
                                .reconnect
                                .as_ref()
                                .map(|policy| policy.is_stable(uptime))
                                .unwrap_or(false);
                            if stable && tracker.last_update().is_some() {
                                attempt = 0;
                            }
                            true
                        }
                    }
                }
                Err(e) => {
                    self.view_tx.send_replace(Some(tracker.view()));
                    e.is_retryable()
                }
            };

            let Some(policy) = self.reconnect.as_ref().filter(|p| retryable && p.should_retry(attempt))
            else {
                tracing::warn!("Giving up on session {}", session_id);
                return self.report(WatchOutcome::Disconnected, tracker.view(), reconnects, &last_error);
            };

            tokio::select! {
                _ = policy.wait_before_retry(attempt) => {}
                _ = self.stop.stopped() => {
                    return self.report(WatchOutcome::Stopped, tracker.view(), reconnects, &last_error);
                }
            }

            attempt += 1;
            reconnects += 1;
        }
    }

    async fn run_forwarding(&self, tracker: &mut AnalysisProgressTracker) -> Option<TerminalOutcome> {
        let mut views = tracker.subscribe();
        self.view_tx.send_replace(Some(tracker.view()));

        let forward = async {
            while views.changed().await.is_ok() {
                let view = views.borrow_and_update().clone();
                self.view_tx.send_replace(Some(view));
            }
        };

        tokio::select! {
            outcome = tracker.run() => outcome,
            _ = forward => None,
        }
    }

    fn report(
        &self,
        outcome: WatchOutcome,
        view: ProgressView,
        reconnects: u32,
        last_error: &Arc<Mutex<Option<String>>>,
    ) -> WatchReport {
        let last_error = last_error.lock().ok().and_then(|slot| slot.clone());
        tracing::info!(
            "Session {} finished watching: {:?} after {} reconnect(s)",
            view.session_id,
            outcome,
            reconnects
        );
        WatchReport {
            outcome,
            view,
            reconnects,
            last_error,
        }
    }
}
