use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::synchronizer::{PlaybackSynchronizer, SessionReport};
use super::MediaSession;
use crate::alert::{EscalatorHandle, EscalatorSnapshot};
use crate::analysis::MediaSource;
use crate::error::MonitorResult;
use crate::models::{AlertRecord, PatientRef, SessionEvent};
use crate::playback::MediaPlayer;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// A started session: its event stream and the task driving it.
pub struct SessionHandle {
    pub session_id: String,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Wait for the session to reach a terminal phase.
    pub async fn finish(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| anyhow!("session task {} panicked: {e}", self.session_id))
    }
}

struct ActiveSession {
    id: String,
    cancel: CancellationToken,
}

/// Surface exposed to the surrounding application.
///
/// Runs at most one session at a time; starting a new one cancels the
/// previous. The escalator outlives sessions, so cancelling never silences a
/// pending alert.
#[derive(Clone)]
pub struct MonitorController {
    synchronizer: Arc<PlaybackSynchronizer>,
    escalator: EscalatorHandle,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl MonitorController {
    pub fn new(synchronizer: PlaybackSynchronizer, escalator: EscalatorHandle) -> Self {
        Self {
            synchronizer: Arc::new(synchronizer),
            escalator,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn start_session(
        &self,
        player: Arc<dyn MediaPlayer>,
        media: MediaSource,
        patient: PatientRef,
    ) -> SessionHandle {
        let session = MediaSession::new(media, patient, player);
        let session_id = session.id.clone();
        let cancel = CancellationToken::new();

        {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                log_info!("[{}] superseded by session {}", previous.id, session_id);
                previous.cancel.cancel();
            }
            *active = Some(ActiveSession {
                id: session_id.clone(),
                cancel: cancel.clone(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let synchronizer = Arc::clone(&self.synchronizer);
        let active = Arc::clone(&self.active);
        let id = session_id.clone();

        let task = tokio::spawn(async move {
            let report = synchronizer.run(session, tx, cancel).await;
            let mut guard = active.lock().await;
            if guard.as_ref().map(|s| s.id == id).unwrap_or(false) {
                *guard = None;
            }
            report
        });

        SessionHandle {
            session_id,
            events: rx,
            task,
        }
    }

    /// Cancel the running session, if any. Returns whether one was running.
    pub async fn cancel_session(&self) -> bool {
        match self.active.lock().await.take() {
            Some(session) => {
                log_info!("[{}] cancel requested", session.id);
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|s| s.id.clone())
    }

    pub async fn acknowledge_current_alert(
        &self,
        identity: &str,
    ) -> MonitorResult<Option<AlertRecord>> {
        self.escalator.acknowledge_current(identity).await
    }

    pub async fn acknowledge_alert(
        &self,
        alert_id: &str,
        identity: &str,
    ) -> MonitorResult<Option<AlertRecord>> {
        self.escalator.acknowledge(alert_id, identity).await
    }

    pub async fn dismiss_alerts(&self) -> MonitorResult<usize> {
        self.escalator.dismiss_all().await
    }

    pub async fn alert_snapshot(&self) -> MonitorResult<EscalatorSnapshot> {
        self.escalator.snapshot().await
    }
}
