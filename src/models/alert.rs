use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IntervalWindow, PatientRef};

pub const NO_MOVEMENT_ALERT: &str = "No Movement Detected";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlertStatus {
    Pending,
    Acknowledged,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "Pending",
            AlertStatus::Acknowledged => "Acknowledged",
        }
    }
}

/// A no-movement alert raised for one window.
///
/// Only the acknowledgment transition mutates a record after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub session_id: String,
    pub alert_type: String,
    pub window: IntervalWindow,
    pub dominant_label: String,
    pub patient: PatientRef,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub status: AlertStatus,
}

impl AlertRecord {
    pub fn is_pending(&self) -> bool {
        self.status == AlertStatus::Pending
    }

    /// Pending → Acknowledged. Returns `false` when already acknowledged.
    pub fn acknowledge(&mut self, identity: &str, at: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(at);
        self.acknowledged_by = Some(identity.to_string());
        true
    }

    pub fn update(&self) -> AlertUpdate {
        AlertUpdate {
            status: self.status,
            acknowledged_at: self.acknowledged_at,
            acknowledged_by: self.acknowledged_by.clone(),
        }
    }
}

/// Fields changed by an acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdate {
    pub status: AlertStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

/// What the acknowledgment surface shows for a pending alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPrompt {
    pub alert_id: String,
    pub time_range: String,
    pub dominant_label: String,
    pub patient_name: String,
    pub patient_id: String,
    /// Alerts waiting behind this one.
    pub queued: usize,
}

impl AlertPrompt {
    pub fn for_record(record: &AlertRecord, queued: usize) -> Self {
        Self {
            alert_id: record.id.clone(),
            time_range: record.window.label(),
            dominant_label: record.dominant_label.clone(),
            patient_name: record.patient.name.clone(),
            patient_id: record.patient.id.clone(),
            queued,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    PrimaryAudio,
    SynthesizedAudio,
    VisualPulse,
}

impl ChannelKind {
    pub fn is_audio(self) -> bool {
        !matches!(self, ChannelKind::VisualPulse)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::PrimaryAudio => write!(f, "primary-audio"),
            ChannelKind::SynthesizedAudio => write!(f, "synthesized-audio"),
            ChannelKind::VisualPulse => write!(f, "visual-pulse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AlertRecord {
        AlertRecord {
            id: "a1".into(),
            session_id: "s1".into(),
            alert_type: NO_MOVEMENT_ALERT.into(),
            window: IntervalWindow {
                index: 1,
                start_time: 5.0,
                end_time: 10.0,
            },
            dominant_label: "supine".into(),
            patient: PatientRef::unknown(),
            file_name: "ward.mp4".into(),
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            status: AlertStatus::Pending,
        }
    }

    #[test]
    fn first_acknowledgment_wins() {
        let mut alert = record();
        let first = Utc::now();
        assert!(alert.acknowledge("nurse1", first));
        assert!(!alert.acknowledge("nurse2", Utc::now()));
        assert_eq!(alert.acknowledged_by.as_deref(), Some("nurse1"));
        assert_eq!(alert.acknowledged_at, Some(first));
        assert_eq!(alert.status, AlertStatus::Acknowledged);
    }

    #[test]
    fn prompt_carries_range_label_and_patient() {
        let prompt = AlertPrompt::for_record(&record(), 2);
        assert_eq!(prompt.time_range, "5.0s - 10.0s");
        assert_eq!(prompt.dominant_label, "supine");
        assert_eq!(prompt.patient_name, "Unknown");
        assert_eq!(prompt.queued, 2);
    }
}
