use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IntervalWindow, PatientRef};

/// One analysed frame inside a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePrediction {
    pub timestamp: f64,
    pub label: String,
    pub confidence: f64,
}

/// Result of analysing a single window. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalResult {
    pub window: IntervalWindow,
    pub per_frame: Vec<FramePrediction>,
    pub dominant_label: String,
    pub changed: bool,
}

/// Most frequent label; ties go to whichever label appeared first.
pub fn dominant_label<'a, I>(labels: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        let count = counts.entry(label).or_insert(0);
        if *count == 0 {
            order.push(label);
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for label in order {
        let count = counts[label];
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((label, count)),
        }
    }
    best.map(|(label, _)| label.to_string())
}

/// Share of frames carrying a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelShare {
    pub label: String,
    pub count: usize,
    pub probability: f64,
}

/// Aggregate over every window of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub dominant_label: String,
    pub average_confidence: f64,
    /// Labels in first-encountered order.
    pub labels: Vec<LabelShare>,
    pub movement_detected: bool,
    pub windows_with_change: usize,
    pub total_windows: usize,
    pub frames_processed: usize,
    pub interval_secs: f64,
    pub movement_summary: String,
}

impl SessionSummary {
    pub fn windows_without_change(&self) -> usize {
        self.total_windows - self.windows_with_change
    }
}

/// Compact per-window line kept with the history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowDigest {
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub changed: bool,
}

impl From<&IntervalResult> for WindowDigest {
    fn from(result: &IntervalResult) -> Self {
        Self {
            start: result.window.start_time,
            end: result.window.end_time,
            label: result.dominant_label.clone(),
            changed: result.changed,
        }
    }
}

/// What gets written to the history store when a session completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub session_id: String,
    pub patient: PatientRef,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub summary: SessionSummary,
    pub windows: Vec<WindowDigest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_label_prefers_first_seen_on_tie() {
        let labels = ["supine", "left", "left", "supine"];
        assert_eq!(dominant_label(labels).as_deref(), Some("supine"));
    }

    #[test]
    fn dominant_label_picks_majority() {
        let labels = ["supine", "left", "left"];
        assert_eq!(dominant_label(labels).as_deref(), Some("left"));
    }

    #[test]
    fn dominant_label_of_nothing_is_none() {
        assert_eq!(dominant_label(std::iter::empty::<&str>()), None);
    }
}
