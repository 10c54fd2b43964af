// src/upload/types.rs
// Upload types and error definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which detection engines the backend should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Voice,
    Video,
    Document,
    Liveness,
    Scam,
    Full,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Document => "document",
            Self::Liveness => "liveness",
            Self::Scam => "scam",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voice" | "audio" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            "document" | "doc" => Ok(Self::Document),
            "liveness" => Ok(Self::Liveness),
            "scam" => Ok(Self::Scam),
            "full" | "all" => Ok(Self::Full),
            other => Err(format!("unknown analysis type '{}'", other)),
        }
    }
}

/// Result of a successful upload: the session to follow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedAnalysis {
    pub session_id: String,
    pub analysis_type: AnalysisType,
    pub file_name: String,
}

/// Upload error types with retry classification
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {reason}")]
    FileError { path: String, reason: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    TimeoutError,

    #[error("Authentication failed")]
    AuthenticationError,

    #[error("File too large for the analysis service")]
    PayloadTooLarge,

    #[error("Rate limit exceeded")]
    RateLimitError,

    #[error("Server error: HTTP {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl UploadError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::NetworkError(_) | UploadError::TimeoutError | UploadError::RateLimitError => {
                true
            }
            UploadError::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
