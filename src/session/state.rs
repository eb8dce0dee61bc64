//! Session lifecycle with explicit transition guards.
//!
//! ```text
//! Idle → Priming → Running(Awaiting ⇄ Analyzing) → Draining → Completed
//!                ↘ Draining (single-window media)
//! any non-terminal → Failed | Cancelled
//! ```
//! `Draining` covers the final window; its two stages are not tracked
//! separately.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sub-state of one window while the session is `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntervalStage {
    /// Playback has not reached the window start yet.
    AwaitingPlaybackReachStart,
    /// The window's analysis request is in flight.
    AnalyzingWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "phase", content = "stage")]
pub enum SessionPhase {
    #[default]
    Idle,
    Priming,
    Running(IntervalStage),
    Draining,
    Completed,
    Failed,
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Move to `next` if the edge exists.
    pub fn advance(&mut self, next: SessionPhase) -> Result<(), IllegalTransition> {
        if !is_legal_transition(*self, next) {
            return Err(IllegalTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Priming => write!(f, "Priming"),
            Self::Running(IntervalStage::AwaitingPlaybackReachStart) => {
                write!(f, "Running/AwaitingPlaybackReachStart")
            }
            Self::Running(IntervalStage::AnalyzingWindow) => write!(f, "Running/AnalyzingWindow"),
            Self::Draining => write!(f, "Draining"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

fn is_legal_transition(from: SessionPhase, to: SessionPhase) -> bool {
    use IntervalStage::*;
    use SessionPhase::*;

    if matches!(to, Failed | Cancelled) && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Idle, Priming)
            | (Priming, Running(AwaitingPlaybackReachStart))
            | (Priming, Draining)
            | (Running(AwaitingPlaybackReachStart), Running(AnalyzingWindow))
            | (Running(AnalyzingWindow), Running(AwaitingPlaybackReachStart))
            | (Running(AnalyzingWindow), Draining)
            | (Draining, Completed)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal session transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_phase() {
        let mut phase = SessionPhase::Idle;
        for next in [
            SessionPhase::Priming,
            SessionPhase::Running(IntervalStage::AwaitingPlaybackReachStart),
            SessionPhase::Running(IntervalStage::AnalyzingWindow),
            SessionPhase::Running(IntervalStage::AwaitingPlaybackReachStart),
            SessionPhase::Running(IntervalStage::AnalyzingWindow),
            SessionPhase::Draining,
            SessionPhase::Completed,
        ] {
            phase.advance(next).unwrap();
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn terminal_phases_are_final() {
        let mut phase = SessionPhase::Failed;
        let err = phase.advance(SessionPhase::Cancelled).unwrap_err();
        assert_eq!(err.from, SessionPhase::Failed);
        assert_eq!(phase, SessionPhase::Failed);
    }

    #[test]
    fn cannot_skip_priming() {
        let mut phase = SessionPhase::Idle;
        assert!(phase.advance(SessionPhase::Draining).is_err());
        assert!(phase.advance(SessionPhase::Failed).is_ok());
    }

    #[test]
    fn single_window_media_goes_straight_to_draining() {
        let mut phase = SessionPhase::Priming;
        assert!(phase.advance(SessionPhase::Draining).is_ok());
    }
}
