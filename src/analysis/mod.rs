//! Boundary to the remote analysis worker.

pub mod http;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::MonitorResult;
use crate::models::{dominant_label, FramePrediction, IntervalResult, IntervalWindow};

pub use http::HttpAnalysisProvider;

/// Media bytes plus the metadata the worker needs to decode them.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

impl MediaSource {
    pub fn from_bytes(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: Arc::new(bytes),
        }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read media file {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let mime_type = mime_for(path).to_string();
        Ok(Self::from_bytes(file_name, mime_type, bytes))
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub media: MediaSource,
    pub window: IntervalWindow,
}

/// Raw answer from a provider for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAnalysis {
    pub per_frame: Vec<FramePrediction>,
    /// Providers may omit this; it is then derived from `per_frame`.
    pub dominant_label: Option<String>,
    pub changed: bool,
}

impl WindowAnalysis {
    pub fn into_result(self, window: IntervalWindow) -> IntervalResult {
        let dominant = self
            .dominant_label
            .filter(|label| !label.is_empty())
            .or_else(|| dominant_label(self.per_frame.iter().map(|f| f.label.as_str())))
            .unwrap_or_else(|| "Unknown".to_string());
        IntervalResult {
            window,
            per_frame: self.per_frame,
            dominant_label: dominant,
            changed: self.changed,
        }
    }
}

/// Anything that can analyse one window of media.
///
/// Errors must be [`crate::error::MonitorError::AnalysisRequestFailed`]
/// carrying a human-readable message.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> MonitorResult<WindowAnalysis>;
}
