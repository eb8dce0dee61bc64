pub mod controller;
pub mod observer;
pub mod state;
pub mod synchronizer;

use std::sync::Arc;

use uuid::Uuid;

use crate::analysis::MediaSource;
use crate::models::{IntervalResult, PatientRef};
use crate::playback::MediaPlayer;

pub use controller::{MonitorController, SessionHandle};
pub use observer::{ClockObserver, SyncGate};
pub use state::{IntervalStage, SessionPhase};
pub use synchronizer::{PlaybackSynchronizer, SessionReport, SynchronizerConfig};

const ENABLE_LOGS: bool = true;

use crate::log_error;

/// One end-to-end run over a single media input.
///
/// Owns the player for as long as the session runs. Created when a file is
/// selected and dropped once a terminal phase is reached.
pub struct MediaSession {
    pub id: String,
    pub media: MediaSource,
    pub patient: PatientRef,
    pub player: Arc<dyn MediaPlayer>,
    pub duration: f64,
    pub current_index: usize,
    pub results: Vec<IntervalResult>,
    pub alert_ids: Vec<String>,
    phase: SessionPhase,
}

impl MediaSession {
    pub fn new(media: MediaSource, patient: PatientRef, player: Arc<dyn MediaPlayer>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            media,
            patient,
            player,
            duration: 0.0,
            current_index: 0,
            results: Vec::new(),
            alert_ids: Vec::new(),
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Illegal transitions are bugs in the driver; they are logged and ignored.
    pub(crate) fn enter(&mut self, next: SessionPhase) {
        if let Err(err) = self.phase.advance(next) {
            log_error!("[{}] {err}", self.id);
        }
    }
}
