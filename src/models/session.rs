use serde::{Deserialize, Serialize};

use super::SessionSummary;

/// The patient a session is monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRef {
    pub id: String,
    pub name: String,
    pub room: Option<String>,
}

impl PatientRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            room: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            id: "N/A".into(),
            name: "Unknown".into(),
            room: None,
        }
    }
}

/// Emitted after each window is dispatched for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub interval_index: usize,
    pub total_intervals: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub percent: f64,
}

/// Stream of events produced by a running session. Exactly one terminal
/// variant (`Completed`, `Failed`, `Cancelled`) ends every stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    Progress(ProgressEvent),
    AlertRaised { alert_id: String, interval_index: usize },
    Completed { summary: SessionSummary },
    Failed { error: String },
    Cancelled,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Completed { .. } | SessionEvent::Failed { .. } | SessionEvent::Cancelled
        )
    }
}
