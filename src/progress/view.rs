use super::stage::{component_label, stage_label, StageColor};
use super::update::{AnalysisStatus, ProgressUpdate};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Transport lifecycle, independent of job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubProgress {
    pub component: String,
    pub label: String,
    pub percent: u8,
}

/// Render-ready snapshot of one tracked analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub session_id: String,
    pub connection_state: ConnectionState,
    pub status: Option<AnalysisStatus>,
    pub progress_percent: u8,
    pub stage: Option<String>,
    pub stage_label: Option<String>,
    pub stage_color: StageColor,
    pub sub_progress: Vec<SubProgress>,
    pub is_terminal_success: bool,
    pub is_terminal_failure: bool,
    pub failure_detail: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ProgressView {
    pub fn build(
        session_id: &str,
        connection_state: ConnectionState,
        last_update: Option<&ProgressUpdate>,
    ) -> Self {
        let status = last_update.map(|u| u.status);
        let stage = last_update.and_then(|u| u.current_stage.clone());

        let sub_progress = last_update
            .map(|u| {
                u.details
                    .iter()
                    .map(|(component, percent)| SubProgress {
                        component: component.clone(),
                        label: component_label(component),
                        percent: *percent,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            session_id: session_id.to_string(),
            connection_state,
            status,
            progress_percent: last_update.map(|u| u.progress_percent).unwrap_or(0),
            stage_label: stage.as_deref().map(stage_label),
            stage_color: stage
                .as_deref()
                .map(StageColor::for_stage)
                .unwrap_or(StageColor::Unknown),
            stage,
            sub_progress,
            is_terminal_success: status == Some(AnalysisStatus::Completed),
            is_terminal_failure: status == Some(AnalysisStatus::Failed),
            failure_detail: last_update.and_then(|u| u.error.clone()),
            last_message_at: last_update.map(|u| u.received_at),
        }
    }

    /// One-line text rendering, e.g. `[ 55%] running   Video Analysis | Video 40% Voice 100%`
    pub fn summary_line(&self) -> String {
        let status = match (self.status, self.connection_state) {
            (Some(AnalysisStatus::Pending), _) => "pending",
            (Some(AnalysisStatus::Running), _) => "running",
            (Some(AnalysisStatus::Completed), _) => "completed",
            (Some(AnalysisStatus::Failed), _) => "failed",
            (None, ConnectionState::Connecting) => "connecting",
            (None, ConnectionState::Connected) => "waiting",
            (None, ConnectionState::Disconnected) => "disconnected",
        };

        let mut line = format!("[{:>3}%] {:<9}", self.progress_percent, status);

        if let Some(label) = &self.stage_label {
            line.push(' ');
            line.push_str(label);
        }

        if !self.sub_progress.is_empty() {
            let parts: Vec<String> = self
                .sub_progress
                .iter()
                .map(|p| format!("{} {}%", p.label, p.percent))
                .collect();
            line.push_str(" | ");
            line.push_str(&parts.join(" "));
        }

        if let Some(detail) = &self.failure_detail {
            line.push_str(" | ");
            line.push_str(detail);
        }

        line.trim_end().to_string()
    }
}
