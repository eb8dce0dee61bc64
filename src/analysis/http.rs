use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::{MonitorError, MonitorResult};
use crate::models::FramePrediction;

use super::{AnalysisProvider, AnalysisRequest, WindowAnalysis};

const INTERVAL_ENDPOINT: &str = "predict_video_interval";

/// Talks to the inference backend's interval endpoint.
pub struct HttpAnalysisProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build analysis HTTP client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), INTERVAL_ENDPOINT),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(request: &AnalysisRequest) -> MonitorResult<Form> {
        let media = &request.media;
        let part = Part::bytes(media.bytes.as_ref().clone())
            .file_name(media.file_name.clone())
            .mime_str(&media.mime_type)
            .map_err(|e| {
                MonitorError::AnalysisRequestFailed(format!(
                    "invalid media type '{}': {e}",
                    media.mime_type
                ))
            })?;

        Ok(Form::new()
            .part("file", part)
            .text("start_time", request.window.start_time.to_string())
            .text("end_time", request.window.end_time.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct IntervalResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    dominant_position: Option<String>,
    #[serde(default)]
    label_changed: bool,
    #[serde(default)]
    predictions: Vec<PredictionPayload>,
}

#[derive(Debug, Deserialize)]
struct PredictionPayload {
    #[serde(default)]
    timestamp: f64,
    prediction: String,
    confidence: f64,
}

fn parse_response(body: &str) -> MonitorResult<WindowAnalysis> {
    let payload: IntervalResponse = serde_json::from_str(body).map_err(|e| {
        MonitorError::AnalysisRequestFailed(format!("malformed analysis response: {e}"))
    })?;

    if let Some(error) = payload.error {
        return Err(MonitorError::AnalysisRequestFailed(error));
    }

    Ok(WindowAnalysis {
        per_frame: payload
            .predictions
            .into_iter()
            .map(|p| FramePrediction {
                timestamp: p.timestamp,
                label: p.prediction,
                confidence: p.confidence,
            })
            .collect(),
        dominant_label: payload.dominant_position,
        changed: payload.label_changed,
    })
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn analyze(&self, request: AnalysisRequest) -> MonitorResult<WindowAnalysis> {
        let form = Self::form(&request)?;
        debug!(
            "POST {} window {} ({})",
            self.endpoint,
            request.window.index,
            request.window.label()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MonitorError::AnalysisRequestFailed(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            MonitorError::AnalysisRequestFailed(format!("failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(MonitorError::AnalysisRequestFailed(format!(
                "Interval processing failed: {} - {}",
                status.as_u16(),
                body
            )));
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_payload() {
        let body = r#"{
            "interval_start": 5.0,
            "interval_end": 10.0,
            "dominant_position": "supine",
            "label_changed": false,
            "predictions": [
                {"frame": 150, "timestamp": 5.0, "prediction": "supine", "confidence": 0.91, "timestamp_formatted": "00:05"},
                {"frame": 160, "timestamp": 5.33, "prediction": "supine", "confidence": 0.88, "timestamp_formatted": "00:05"}
            ]
        }"#;

        let analysis = parse_response(body).unwrap();
        assert_eq!(analysis.dominant_label.as_deref(), Some("supine"));
        assert!(!analysis.changed);
        assert_eq!(analysis.per_frame.len(), 2);
        assert_eq!(analysis.per_frame[1].timestamp, 5.33);
        assert_eq!(analysis.per_frame[0].confidence, 0.91);
    }

    #[test]
    fn error_body_becomes_request_failure() {
        let err = parse_response(r#"{"error": "No frames analyzed"}"#).unwrap_err();
        assert_eq!(
            err,
            MonitorError::AnalysisRequestFailed("No frames analyzed".into())
        );
    }

    #[test]
    fn garbage_body_is_a_request_failure() {
        assert!(matches!(
            parse_response("<html>"),
            Err(MonitorError::AnalysisRequestFailed(_))
        ));
    }

    #[test]
    fn endpoint_is_joined_without_double_slash() {
        let provider =
            HttpAnalysisProvider::new("http://10.0.0.2:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.endpoint(),
            "http://10.0.0.2:5000/predict_video_interval"
        );
    }
}
