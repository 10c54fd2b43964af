use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Server-side job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(Self::Pending),
            "running" | "processing" | "in_progress" => Some(Self::Running),
            "completed" | "complete" | "done" => Some(Self::Completed),
            "failed" | "error" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One progress message received over the channel.
///
/// Parsing is lenient: fields with an unexpected type are ignored rather than
/// rejecting the whole message, so a schema drift on the server never tears
/// down the subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: AnalysisStatus,
    pub progress_percent: u8,
    pub current_stage: Option<String>,
    /// Component name -> sub-progress percent
    pub details: BTreeMap<String, u8>,
    /// Failure detail reported by the server, if any
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(status: AnalysisStatus) -> Self {
        Self {
            status,
            progress_percent: 0,
            current_stage: None,
            details: BTreeMap::new(),
            error: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress_percent = percent.min(100);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = Some(stage.into());
        self
    }

    pub fn with_detail(mut self, component: impl Into<String>, percent: u8) -> Self {
        self.details.insert(component.into(), percent.min(100));
        self
    }

    /// Parse a raw channel payload. Returns `None` when the payload is not a
    /// JSON object or its status cannot be determined.
    pub fn from_json(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let status = field_str(object, &["status"])
            .and_then(AnalysisStatus::parse)
            .or_else(|| field_str(object, &["type", "event"]).and_then(status_from_kind))?;

        let progress_percent =
            field_percent(object, &["progress_percent", "progressPercent", "progress"]).unwrap_or(0);

        let current_stage = field_str(object, &["current_stage", "currentStage", "stage"])
            .map(str::trim)
            .filter(|stage| !stage.is_empty())
            .map(str::to_string);

        let details = object
            .get("details")
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(name, value)| as_percent(value).map(|p| (name.clone(), p)))
                    .collect()
            })
            .unwrap_or_default();

        let error = field_str(object, &["error", "message", "reason"])
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
            .map(str::to_string);

        Some(Self {
            status,
            progress_percent,
            current_stage,
            details,
            error,
            received_at: Utc::now(),
        })
    }
}

fn status_from_kind(kind: &str) -> Option<AnalysisStatus> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "progress" => Some(AnalysisStatus::Running),
        "completed" | "complete" => Some(AnalysisStatus::Completed),
        "failed" | "error" => Some(AnalysisStatus::Failed),
        _ => None,
    }
}

fn field_percent(object: &Map<String, Value>, names: &[&str]) -> Option<u8> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find_map(as_percent)
}

fn field_str<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find_map(Value::as_str)
}

fn as_percent(value: &Value) -> Option<u8> {
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_message() {
        let update = ProgressUpdate::from_json(
            r#"{"type":"progress","status":"running","progressPercent":55,
                "currentStage":"video_analysis",
                "details":{"voice_progress":100,"video_progress":40}}"#,
        )
        .unwrap();

        assert_eq!(update.status, AnalysisStatus::Running);
        assert_eq!(update.progress_percent, 55);
        assert_eq!(update.current_stage.as_deref(), Some("video_analysis"));
        assert_eq!(update.details.get("voice_progress"), Some(&100));
        assert_eq!(update.details.get("video_progress"), Some(&40));
    }

    #[test]
    fn test_snake_case_fields() {
        let update = ProgressUpdate::from_json(
            r#"{"status":"running","progress_percent":10,"current_stage":"voice_analysis"}"#,
        )
        .unwrap();
        assert_eq!(update.progress_percent, 10);
        assert_eq!(update.current_stage.as_deref(), Some("voice_analysis"));
    }

    #[test]
    fn test_status_from_discriminator() {
        let done = ProgressUpdate::from_json(r#"{"type":"completed"}"#).unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);

        let failed =
            ProgressUpdate::from_json(r#"{"type":"failed","error":"decoder crashed"}"#).unwrap();
        assert_eq!(failed.status, AnalysisStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("decoder crashed"));

        let progress = ProgressUpdate::from_json(r#"{"type":"progress","progress":3}"#).unwrap();
        assert_eq!(progress.status, AnalysisStatus::Running);
    }

    #[test]
    fn test_explicit_status_wins_over_discriminator() {
        let update = ProgressUpdate::from_json(r#"{"type":"progress","status":"failed"}"#).unwrap();
        assert_eq!(update.status, AnalysisStatus::Failed);
    }

    #[test]
    fn test_wrong_types_are_ignored() {
        let update = ProgressUpdate::from_json(
            r#"{"status":"running","progressPercent":"fifty","currentStage":7,
                "details":{"voice":"n/a","video":12.6,"doc":null}}"#,
        )
        .unwrap();

        assert_eq!(update.progress_percent, 0);
        assert_eq!(update.current_stage, None);
        assert_eq!(update.details.len(), 1);
        assert_eq!(update.details.get("video"), Some(&13));
    }

    #[test]
    fn test_wrong_typed_alias_falls_through() {
        let update =
            ProgressUpdate::from_json(r#"{"status":"running","progressPercent":"x","progress":40}"#)
                .unwrap();
        assert_eq!(update.progress_percent, 40);
    }

    #[test]
    fn test_out_of_range_percent_clamped() {
        let high = ProgressUpdate::from_json(r#"{"status":"running","progress":140}"#).unwrap();
        assert_eq!(high.progress_percent, 100);

        let low = ProgressUpdate::from_json(r#"{"status":"running","progress":-5}"#).unwrap();
        assert_eq!(low.progress_percent, 0);
    }

    #[test]
    fn test_unparseable_messages() {
        assert!(ProgressUpdate::from_json("not json").is_none());
        assert!(ProgressUpdate::from_json("[1,2,3]").is_none());
        assert!(ProgressUpdate::from_json(r#"{"progress":50}"#).is_none());
        assert!(ProgressUpdate::from_json(r#"{"status":"exploded"}"#).is_none());
        assert!(ProgressUpdate::from_json(r#"{"type":"heartbeat"}"#).is_none());
    }

    #[test]
    fn test_status_aliases() {
        assert_eq!(AnalysisStatus::parse("Queued"), Some(AnalysisStatus::Pending));
        assert_eq!(AnalysisStatus::parse("processing"), Some(AnalysisStatus::Running));
        assert_eq!(AnalysisStatus::parse(" COMPLETED "), Some(AnalysisStatus::Completed));
        assert!(AnalysisStatus::Failed.is_terminal());
        assert!(!AnalysisStatus::Running.is_terminal());
    }
}
