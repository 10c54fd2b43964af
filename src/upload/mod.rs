// src/upload/mod.rs
// Upload Module - submits media to the detection backend

mod client;
mod types;

pub use client::AnalysisClient;
pub use types::{AnalysisType, SubmittedAnalysis, UploadError};
