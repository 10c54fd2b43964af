use serde::Serialize;

/// Presentation category for a processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageColor {
    Voice,
    Video,
    Document,
    Liveness,
    Scam,
    Fusion,
    Unknown,
}

impl StageColor {
    /// Fixed lookup from known stage names. The server's vocabulary is open,
    /// so anything else maps to `Unknown`.
    pub fn for_stage(stage: &str) -> Self {
        match stage.trim().to_ascii_lowercase().as_str() {
            "voice_analysis" => Self::Voice,
            "video_analysis" => Self::Video,
            "document_verification" => Self::Document,
            "liveness_detection" => Self::Liveness,
            "scam_detection" => Self::Scam,
            "fusion_scoring" => Self::Fusion,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Document => "document",
            Self::Liveness => "liveness",
            Self::Scam => "scam",
            Self::Fusion => "fusion",
            Self::Unknown => "unknown",
        }
    }
}

/// `voice_analysis` -> `Voice Analysis`, `pre-check` -> `Pre-Check`
pub fn stage_label(stage: &str) -> String {
    let mut out = String::with_capacity(stage.len());
    let mut capitalize_next = true;

    for ch in stage.chars() {
        if ch == '_' {
            out.push(' ');
            capitalize_next = true;
            continue;
        }

        if capitalize_next {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        capitalize_next = ch.is_whitespace() || ch == '-';
    }

    out
}

/// Label for a `details` entry: `voice_progress` -> `Voice`
pub fn component_label(component: &str) -> String {
    let trimmed = component
        .strip_suffix("_progress")
        .filter(|rest| !rest.is_empty())
        .unwrap_or(component);
    stage_label(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_label() {
        assert_eq!(stage_label("fusion_scoring"), "Fusion Scoring");
        assert_eq!(stage_label("x_y_z"), "X Y Z");
        assert_eq!(stage_label("voice_analysis"), "Voice Analysis");
        assert_eq!(stage_label(""), "");
    }

    #[test]
    fn test_stage_label_keeps_inner_case() {
        assert_eq!(stage_label("ocr_PDF_check"), "Ocr PDF Check");
        assert_eq!(stage_label("already Spaced"), "Already Spaced");
    }

    #[test]
    fn test_stage_label_hyphenated_words() {
        assert_eq!(stage_label("pre-check_stage"), "Pre-Check Stage");
        assert_eq!(stage_label("anti-spoof"), "Anti-Spoof");
    }

    #[test]
    fn test_known_stage_colors() {
        assert_eq!(StageColor::for_stage("voice_analysis"), StageColor::Voice);
        assert_eq!(StageColor::for_stage("video_analysis"), StageColor::Video);
        assert_eq!(StageColor::for_stage("document_verification"), StageColor::Document);
        assert_eq!(StageColor::for_stage("liveness_detection"), StageColor::Liveness);
        assert_eq!(StageColor::for_stage("scam_detection"), StageColor::Scam);
        assert_eq!(StageColor::for_stage("fusion_scoring"), StageColor::Fusion);
    }

    #[test]
    fn test_unknown_stage_falls_back() {
        assert_eq!(StageColor::for_stage("metadata_extraction"), StageColor::Unknown);
        assert_eq!(StageColor::for_stage(""), StageColor::Unknown);
        assert_eq!(StageColor::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_component_label() {
        assert_eq!(component_label("voice_progress"), "Voice");
        assert_eq!(component_label("document"), "Document");
        assert_eq!(component_label("_progress"), " Progress");
    }
}
