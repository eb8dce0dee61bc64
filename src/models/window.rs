use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Length of an analysis window, in seconds of media time.
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// A contiguous `[start, end)` slice of the media timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalWindow {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
}

impl IntervalWindow {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Human-readable range, e.g. `5.0s - 10.0s`.
    pub fn label(&self) -> String {
        format!("{:.1}s - {:.1}s", self.start_time, self.end_time)
    }
}

/// Number of windows needed to cover `duration`.
pub fn interval_count(duration: f64, interval_secs: f64) -> MonitorResult<usize> {
    validate(duration, interval_secs)?;
    let mut total = (duration / interval_secs).ceil().max(1.0) as usize;
    // Division can round up past an exact multiple; never emit an empty tail.
    while total > 1 && (total - 1) as f64 * interval_secs >= duration {
        total -= 1;
    }
    Ok(total)
}

/// Build the `index`-th window. Start times are derived by multiplication
/// rather than accumulation so no rounding drift builds up over long media.
pub fn window_at(index: usize, duration: f64, interval_secs: f64) -> IntervalWindow {
    let start_time = index as f64 * interval_secs;
    let end_time = ((index + 1) as f64 * interval_secs).min(duration);
    IntervalWindow {
        index,
        start_time,
        end_time,
    }
}

/// Partition `[0, duration)` into consecutive windows of `interval_secs`.
/// The last window is truncated so its end equals `duration` exactly.
pub fn plan_windows(duration: f64, interval_secs: f64) -> MonitorResult<Vec<IntervalWindow>> {
    let total = interval_count(duration, interval_secs)?;
    Ok((0..total)
        .map(|index| window_at(index, duration, interval_secs))
        .collect())
}

fn validate(duration: f64, interval_secs: f64) -> MonitorResult<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MonitorError::InvalidMedia(format!(
            "media duration must be positive, got {duration}"
        )));
    }
    if !interval_secs.is_finite() || interval_secs <= 0.0 {
        return Err(MonitorError::InvalidMedia(format!(
            "interval length must be positive, got {interval_secs}"
        )));
    }
    Ok(())
}
