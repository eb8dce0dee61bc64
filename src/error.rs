//! Error taxonomy for the monitoring core.
//!
//! | Variant                 | Fatal to           | Surfaced how                     |
//! |-------------------------|--------------------|----------------------------------|
//! | `InvalidMedia`          | session (pre-start)| terminal `Failed` event          |
//! | `AnalysisRequestFailed` | current session    | terminal `Failed` event          |
//! | `PersistenceFailed`     | nothing            | logged only                      |
//! | `ChannelUnavailable`    | nothing            | logged, triggers channel fallback|
//! | `EmptyAnalysis`         | summary            | terminal `Failed` event          |
//! | `Cancelled`             | current session    | terminal `Cancelled` event       |

use thiserror::Error;

use crate::models::ChannelKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MonitorError {
    #[error("invalid media: {0}")]
    InvalidMedia(String),

    #[error("{0}")]
    AnalysisRequestFailed(String),

    #[error("history write failed: {0}")]
    PersistenceFailed(String),

    #[error("{channel} channel unavailable: {reason}")]
    ChannelUnavailable { channel: ChannelKind, reason: String },

    #[error("no frame predictions to summarise")]
    EmptyAnalysis,

    #[error("session cancelled")]
    Cancelled,

    #[error("alert escalator is no longer running")]
    EscalatorClosed,
}

impl MonitorError {
    /// Whether the error ends the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::PersistenceFailed(_) | Self::ChannelUnavailable { .. }
        )
    }

    pub fn channel(channel: ChannelKind, reason: impl Into<String>) -> Self {
        Self::ChannelUnavailable {
            channel,
            reason: reason.into(),
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorbed_errors_are_not_fatal() {
        assert!(!MonitorError::PersistenceFailed("disk full".into()).is_fatal());
        assert!(!MonitorError::channel(ChannelKind::PrimaryAudio, "no device").is_fatal());
        assert!(MonitorError::InvalidMedia("zero duration".into()).is_fatal());
        assert!(MonitorError::AnalysisRequestFailed("502".into()).is_fatal());
    }

    #[test]
    fn analysis_failure_keeps_provider_message() {
        let err = MonitorError::AnalysisRequestFailed(
            "Interval processing failed: 500 - boom".into(),
        );
        assert_eq!(err.to_string(), "Interval processing failed: 500 - boom");
    }
}
