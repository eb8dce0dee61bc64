//! Session summary compiler.

use std::collections::HashMap;

use crate::error::{MonitorError, MonitorResult};
use crate::models::{IntervalResult, LabelShare, SessionSummary};

/// Fold every window's per-frame predictions into one summary.
///
/// Fails with [`MonitorError::EmptyAnalysis`] when there is not a single
/// frame to average over.
pub fn compile_summary(
    results: &[IntervalResult],
    interval_secs: f64,
) -> MonitorResult<SessionSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut total_confidence = 0.0;
    let mut frames = 0usize;

    for frame in results.iter().flat_map(|r| r.per_frame.iter()) {
        let count = counts.entry(frame.label.as_str()).or_insert(0);
        if *count == 0 {
            order.push(frame.label.as_str());
        }
        *count += 1;
        total_confidence += frame.confidence;
        frames += 1;
    }

    if frames == 0 {
        return Err(MonitorError::EmptyAnalysis);
    }

    let labels: Vec<LabelShare> = order
        .iter()
        .map(|label| {
            let count = counts[label];
            LabelShare {
                label: label.to_string(),
                count,
                probability: count as f64 / frames as f64,
            }
        })
        .collect();

    let mut dominant = &labels[0];
    for share in &labels[1..] {
        if share.count > dominant.count {
            dominant = share;
        }
    }

    let windows_with_change = results.iter().filter(|r| r.changed).count();
    let movement_summary = if windows_with_change > 0 {
        format!(
            "Movement detected in {} out of {} intervals",
            windows_with_change,
            results.len()
        )
    } else {
        "No movement detected throughout video".to_string()
    };

    Ok(SessionSummary {
        dominant_label: dominant.label.clone(),
        average_confidence: total_confidence / frames as f64,
        movement_detected: windows_with_change > 0,
        windows_with_change,
        total_windows: results.len(),
        frames_processed: frames,
        interval_secs,
        movement_summary,
        labels,
    })
}
