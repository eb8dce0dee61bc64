use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use uuid::Uuid;

use super::{AcknowledgmentSurface, AlertChannel};
use crate::error::{MonitorError, MonitorResult};
use crate::history::HistoryEmitter;
use crate::models::{
    AlertPrompt, AlertRecord, AlertStatus, ChannelKind, IntervalWindow, PatientRef,
    NO_MOVEMENT_ALERT,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Audio channels in fallback order.
const AUDIO_FALLBACK: [ChannelKind; 2] = [ChannelKind::PrimaryAudio, ChannelKind::SynthesizedAudio];

#[derive(Debug, Clone)]
pub struct EscalatorConfig {
    /// Period between signal re-triggers while an alert is pending.
    pub repeat: Duration,
    /// Keep the visual pulse running next to a working audio channel.
    pub visual_with_audio: bool,
}

impl Default for EscalatorConfig {
    fn default() -> Self {
        Self {
            repeat: Duration::from_secs(5),
            visual_with_audio: true,
        }
    }
}

/// The three signal channels, one per [`ChannelKind`].
pub struct SignalChannels {
    pub primary: Box<dyn AlertChannel>,
    pub synthesized: Box<dyn AlertChannel>,
    pub visual: Box<dyn AlertChannel>,
}

impl SignalChannels {
    fn get(&mut self, kind: ChannelKind) -> &mut dyn AlertChannel {
        match kind {
            ChannelKind::PrimaryAudio => self.primary.as_mut(),
            ChannelKind::SynthesizedAudio => self.synthesized.as_mut(),
            ChannelKind::VisualPulse => self.visual.as_mut(),
        }
    }
}

/// Everything needed to open an alert for an unchanged window.
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub session_id: String,
    pub window: IntervalWindow,
    pub dominant_label: String,
    pub patient: PatientRef,
    pub file_name: String,
}

/// Returned by [`EscalatorHandle::raise`]. Dropping it does not affect the alert.
pub struct AlertTicket {
    pub alert_id: String,
    acknowledged: oneshot::Receiver<AlertRecord>,
}

impl AlertTicket {
    /// Resolves once, when the alert is acknowledged.
    pub async fn acknowledged(self) -> MonitorResult<AlertRecord> {
        self.acknowledged
            .await
            .map_err(|_| MonitorError::EscalatorClosed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscalatorSnapshot {
    pub current: Option<AlertRecord>,
    pub queued: usize,
    pub active_audio: Option<ChannelKind>,
    pub visual_active: bool,
    pub fires: u64,
}

enum EscalatorCommand {
    Raise {
        id: String,
        request: AlertRequest,
        done: oneshot::Sender<AlertRecord>,
    },
    Acknowledge {
        alert_id: Option<String>,
        identity: String,
        reply: oneshot::Sender<Option<AlertRecord>>,
    },
    DismissAll {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<EscalatorSnapshot>,
    },
}

#[derive(Clone)]
pub struct EscalatorHandle {
    tx: mpsc::UnboundedSender<EscalatorCommand>,
}

impl EscalatorHandle {
    /// Open an alert without waiting for anything. Never blocks the caller.
    pub fn raise(&self, request: AlertRequest) -> AlertTicket {
        let id = format!("alert_{}", Uuid::new_v4());
        let (done_tx, done_rx) = oneshot::channel();
        let command = EscalatorCommand::Raise {
            id: id.clone(),
            request,
            done: done_tx,
        };
        if self.tx.send(command).is_err() {
            log_error!("alert escalator stopped; alert {id} was not raised");
        }
        AlertTicket {
            alert_id: id,
            acknowledged: done_rx,
        }
    }

    /// Acknowledge a specific alert. Returns `None` if it was already
    /// acknowledged or is unknown.
    pub async fn acknowledge(
        &self,
        alert_id: &str,
        identity: &str,
    ) -> MonitorResult<Option<AlertRecord>> {
        self.send_acknowledge(Some(alert_id.to_string()), identity)
            .await
    }

    /// Acknowledge whatever alert is escalating right now.
    pub async fn acknowledge_current(&self, identity: &str) -> MonitorResult<Option<AlertRecord>> {
        self.send_acknowledge(None, identity).await
    }

    async fn send_acknowledge(
        &self,
        alert_id: Option<String>,
        identity: &str,
    ) -> MonitorResult<Option<AlertRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EscalatorCommand::Acknowledge {
                alert_id,
                identity: identity.to_string(),
                reply,
            })
            .map_err(|_| MonitorError::EscalatorClosed)?;
        rx.await.map_err(|_| MonitorError::EscalatorClosed)
    }

    /// Stop signaling and drop every pending alert without acknowledging it.
    pub async fn dismiss_all(&self) -> MonitorResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EscalatorCommand::DismissAll { reply })
            .map_err(|_| MonitorError::EscalatorClosed)?;
        rx.await.map_err(|_| MonitorError::EscalatorClosed)
    }

    pub async fn snapshot(&self) -> MonitorResult<EscalatorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EscalatorCommand::Snapshot { reply })
            .map_err(|_| MonitorError::EscalatorClosed)?;
        rx.await.map_err(|_| MonitorError::EscalatorClosed)
    }
}

struct PendingAlert {
    record: AlertRecord,
    done: Option<oneshot::Sender<AlertRecord>>,
}

/// Owns alert lifecycles and the signal loop.
///
/// Runs as its own task so the synchronizer only ever pays for a channel
/// send. At most one alert escalates at a time; later ones wait in FIFO order
/// until the current one is acknowledged.
pub struct AlertEscalator {
    channels: SignalChannels,
    surface: Arc<dyn AcknowledgmentSurface>,
    history: HistoryEmitter,
    config: EscalatorConfig,
    current: Option<PendingAlert>,
    queue: VecDeque<PendingAlert>,
    active_audio: Option<ChannelKind>,
    visual_active: bool,
    next_fire: Option<Instant>,
    fires: u64,
    commands: mpsc::UnboundedReceiver<EscalatorCommand>,
    /// Commands received while a channel was starting, handled in order
    /// once the round yields.
    deferred: VecDeque<EscalatorCommand>,
}

impl AlertEscalator {
    pub fn spawn(
        channels: SignalChannels,
        surface: Arc<dyn AcknowledgmentSurface>,
        history: HistoryEmitter,
        config: EscalatorConfig,
    ) -> EscalatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let escalator = Self {
            channels,
            surface,
            history,
            config,
            current: None,
            queue: VecDeque::new(),
            active_audio: None,
            visual_active: false,
            next_fire: None,
            fires: 0,
            commands: rx,
            deferred: VecDeque::new(),
        };
        tokio::spawn(escalator.run());
        EscalatorHandle { tx }
    }

    async fn run(mut self) {
        loop {
            while let Some(command) = self.deferred.pop_front() {
                self.handle(command).await;
            }

            let deadline = self.next_fire;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = wait_until(deadline) => {
                    self.fire().await;
                    self.next_fire = Some(Instant::now() + self.config.repeat);
                }
            }
        }

        self.silence().await;
        log_info!("alert escalator shutting down");
    }

    async fn handle(&mut self, command: EscalatorCommand) {
        match command {
            EscalatorCommand::Raise { id, request, done } => self.raise(id, request, done).await,
            EscalatorCommand::Acknowledge {
                alert_id,
                identity,
                reply,
            } => {
                let record = self.acknowledge(alert_id.as_deref(), &identity).await;
                let _ = reply.send(record);
            }
            EscalatorCommand::DismissAll { reply } => {
                let dismissed = self.dismiss_all().await;
                let _ = reply.send(dismissed);
            }
            EscalatorCommand::Snapshot { reply } => {
                let _ = reply.send(EscalatorSnapshot {
                    current: self.current.as_ref().map(|p| p.record.clone()),
                    queued: self.queue.len(),
                    active_audio: self.active_audio,
                    visual_active: self.visual_active,
                    fires: self.fires,
                });
            }
        }
    }

    async fn raise(&mut self, id: String, request: AlertRequest, done: oneshot::Sender<AlertRecord>) {
        let record = AlertRecord {
            id,
            session_id: request.session_id,
            alert_type: NO_MOVEMENT_ALERT.to_string(),
            window: request.window,
            dominant_label: request.dominant_label,
            patient: request.patient,
            file_name: request.file_name,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            status: AlertStatus::Pending,
        };
        log_warn!(
            "no movement in {} for patient {} ({}); alert {}",
            record.window.label(),
            record.patient.name,
            record.dominant_label,
            record.id
        );

        self.history.emit_alert(record.clone());

        let pending = PendingAlert {
            record,
            done: Some(done),
        };
        if self.current.is_none() {
            self.activate(pending).await;
        } else {
            log_info!(
                "alert {} queued behind {} pending alert(s)",
                pending.record.id,
                self.queue.len() + 1
            );
            self.queue.push_back(pending);
        }
    }

    async fn activate(&mut self, pending: PendingAlert) {
        let prompt = AlertPrompt::for_record(&pending.record, self.queue.len());
        self.current = Some(pending);
        self.surface.present(&prompt);
        self.fire().await;
        self.next_fire = Some(Instant::now() + self.config.repeat);
    }

    /// One signal round. The previously active audio channel is released
    /// before any channel is (re)started, and every round re-tries channels
    /// in fallback order since failures are often transient.
    async fn fire(&mut self) {
        self.fires += 1;

        if let Some(kind) = self.active_audio.take() {
            self.channels.get(kind).stop().await;
        }

        for kind in AUDIO_FALLBACK {
            match self.start_channel(kind).await {
                None => return,
                Some(Ok(())) => {
                    self.active_audio = Some(kind);
                    break;
                }
                Some(Err(err)) => log_warn!("{err}; falling back"),
            }
        }

        let want_visual = self.config.visual_with_audio || self.active_audio.is_none();
        if want_visual {
            match self.start_channel(ChannelKind::VisualPulse).await {
                None => return,
                Some(Ok(())) => self.visual_active = true,
                Some(Err(err)) => {
                    log_warn!("{err}");
                    // A failed re-trigger may leave the previous pulse running.
                    self.channels.get(ChannelKind::VisualPulse).stop().await;
                    self.visual_active = false;
                }
            }
        } else if self.visual_active {
            self.channels.get(ChannelKind::VisualPulse).stop().await;
            self.visual_active = false;
        }

        if self.active_audio.is_none() && !self.visual_active {
            log_error!("every signal channel failed; only the acknowledgment prompt remains");
        }
    }

    /// Start one channel while still accepting commands. Returns `None` when
    /// an acknowledgment or dismissal of the current alert arrived first; the
    /// start is abandoned and the command is handled once the round returns.
    async fn start_channel(&mut self, kind: ChannelKind) -> Option<MonitorResult<()>> {
        let current_id = self.current.as_ref().map(|p| p.record.id.as_str());
        let mut start = self.channels.get(kind).start();
        loop {
            let outcome = tokio::select! {
                biased;
                command = self.commands.recv() => Err(command),
                result = &mut start => Ok(result),
            };
            match outcome {
                Ok(result) => return Some(result),
                Err(Some(command)) => {
                    let stops_round = interrupts_round(&command, current_id);
                    self.deferred.push_back(command);
                    if stops_round {
                        log_debug!("{kind} start abandoned for a pending command");
                        return None;
                    }
                }
                Err(None) => return Some(start.await),
            }
        }
    }

    /// Stop every channel, whatever the escalator believes is active.
    /// `stop` is a no-op on idle channels.
    async fn silence(&mut self) {
        self.next_fire = None;
        self.active_audio = None;
        self.visual_active = false;
        for kind in [
            ChannelKind::PrimaryAudio,
            ChannelKind::SynthesizedAudio,
            ChannelKind::VisualPulse,
        ] {
            self.channels.get(kind).stop().await;
        }
    }

    async fn acknowledge(&mut self, alert_id: Option<&str>, identity: &str) -> Option<AlertRecord> {
        let is_current = match (&self.current, alert_id) {
            (Some(current), Some(id)) => current.record.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let mut pending = if is_current {
            self.silence().await;
            let pending = self.current.take()?;
            self.surface.dismiss(&pending.record.id);
            pending
        } else {
            let id = alert_id?;
            let position = self.queue.iter().position(|p| p.record.id == id)?;
            self.queue.remove(position)?
        };

        pending.record.acknowledge(identity, Utc::now());
        log_info!(
            "alert {} acknowledged by {}",
            pending.record.id,
            identity
        );

        self.history
            .update_alert(pending.record.id.clone(), pending.record.update());
        if let Some(done) = pending.done.take() {
            let _ = done.send(pending.record.clone());
        }

        if self.current.is_none() {
            if let Some(next) = self.queue.pop_front() {
                self.activate(next).await;
            }
        }

        Some(pending.record)
    }

    async fn dismiss_all(&mut self) -> usize {
        self.silence().await;
        let mut dismissed = self.queue.len();
        self.queue.clear();
        if let Some(current) = self.current.take() {
            self.surface.dismiss(&current.record.id);
            dismissed += 1;
        }
        if dismissed > 0 {
            log_warn!("dismissed {dismissed} pending alert(s) without acknowledgment");
        }
        dismissed
    }
}

fn interrupts_round(command: &EscalatorCommand, current_id: Option<&str>) -> bool {
    match command {
        EscalatorCommand::DismissAll { .. } => true,
        EscalatorCommand::Acknowledge { alert_id: None, .. } => true,
        EscalatorCommand::Acknowledge {
            alert_id: Some(id), ..
        } => current_id == Some(id.as_str()),
        EscalatorCommand::Raise { .. } | EscalatorCommand::Snapshot { .. } => false,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::alert::{EventSurface, SurfaceEvent};
    use crate::history::testing::RecordingHistory;

    struct Harness {
        handle: EscalatorHandle,
        tallies: Tallies,
        history: Arc<RecordingHistory>,
        surface: EventSurface,
    }

    fn harness(config: EscalatorConfig, history: RecordingHistory) -> Harness {
        let (channels, tallies) = fake_channels();
        let history = Arc::new(history);
        let surface = EventSurface::new();
        let handle = AlertEscalator::spawn(
            channels,
            Arc::new(surface.clone()),
            HistoryEmitter::new(history.clone()),
            config,
        );
        Harness {
            handle,
            tallies,
            history,
            surface,
        }
    }

    fn request(index: usize, label: &str) -> AlertRequest {
        AlertRequest {
            session_id: "s1".into(),
            window: IntervalWindow {
                index,
                start_time: index as f64 * 5.0,
                end_time: (index + 1) as f64 * 5.0,
            },
            dominant_label: label.into(),
            patient: PatientRef::new("P-1", "Ada"),
            file_name: "ward.mp4".into(),
        }
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn raise_persists_presents_and_signals() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        let mut surface = h.surface.subscribe();

        let ticket = h.handle.raise(request(1, "supine"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        let current = snapshot.current.unwrap();
        assert_eq!(current.id, ticket.alert_id);
        assert_eq!(current.status, AlertStatus::Pending);
        assert_eq!(snapshot.active_audio, Some(ChannelKind::PrimaryAudio));
        assert!(snapshot.visual_active);
        assert_eq!(h.history.alert_count(), 1);

        match surface.recv().await.unwrap() {
            SurfaceEvent::Presented(prompt) => {
                assert_eq!(prompt.alert_id, ticket.alert_id);
                assert_eq!(prompt.time_range, "5.0s - 10.0s");
                assert_eq!(prompt.dominant_label, "supine");
                assert_eq!(prompt.patient_name, "Ada");
            }
            other => panic!("unexpected surface event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn signal_refires_every_period_until_acknowledged() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        h.handle.raise(request(0, "supine"));
        settle().await;
        assert_eq!(h.tallies.primary.start_calls(), 1);

        time::sleep(Duration::from_secs(12)).await;
        assert_eq!(h.tallies.primary.start_calls(), 3);

        h.handle.acknowledge_current("nurse1").await.unwrap().unwrap();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.tallies.primary.start_calls(), 3);
        assert!(h.tallies.all_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledging_twice_has_one_effect() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        let ticket = h.handle.raise(request(0, "supine"));
        let alert_id = ticket.alert_id.clone();
        settle().await;

        let first = h.handle.acknowledge(&alert_id, "nurse1").await.unwrap();
        let second = h.handle.acknowledge(&alert_id, "nurse2").await.unwrap();
        settle().await;

        let record = first.unwrap();
        assert_eq!(record.status, AlertStatus::Acknowledged);
        assert_eq!(record.acknowledged_by.as_deref(), Some("nurse1"));
        assert!(record.acknowledged_at.is_some());
        assert!(second.is_none());
        assert_eq!(h.history.update_count(), 1);
        assert!(h.handle.acknowledge_current("nurse3").await.unwrap().is_none());

        let resolved = ticket.acknowledged().await.unwrap();
        assert_eq!(resolved.acknowledged_by.as_deref(), Some("nurse1"));
    }

    #[tokio::test(start_paused = true)]
    async fn primary_failure_falls_back_to_synthesized() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        h.tallies.primary.set_failing(true);

        h.handle.raise(request(0, "supine"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.active_audio, Some(ChannelKind::SynthesizedAudio));
        assert!(h.tallies.synthesized.is_active());
        assert!(!h.tallies.primary.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn both_audio_failures_engage_visual_pulse() {
        let config = EscalatorConfig {
            visual_with_audio: false,
            ..EscalatorConfig::default()
        };
        let h = harness(config, RecordingHistory::default());
        h.tallies.primary.set_failing(true);
        h.tallies.synthesized.set_failing(true);

        h.handle.raise(request(0, "supine"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.active_audio, None);
        assert!(snapshot.visual_active);
        assert!(h.tallies.visual.is_active());
        assert_eq!(h.tallies.primary.start_calls(), 1);
        assert_eq!(h.tallies.synthesized.start_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_primary_takes_over_on_next_period() {
        let config = EscalatorConfig {
            visual_with_audio: false,
            ..EscalatorConfig::default()
        };
        let h = harness(config, RecordingHistory::default());
        h.tallies.primary.set_failing(true);

        h.handle.raise(request(0, "supine"));
        settle().await;
        assert!(h.tallies.synthesized.is_active());

        h.tallies.primary.set_failing(false);
        time::sleep(Duration::from_secs(5)).await;
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.active_audio, Some(ChannelKind::PrimaryAudio));
        assert!(!h.tallies.synthesized.is_active());
        assert!(h.tallies.synthesized.balanced());
        assert!(!snapshot.visual_active);
    }

    #[tokio::test(start_paused = true)]
    async fn second_alert_waits_for_the_first() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        let first = h.handle.raise(request(1, "supine"));
        let second = h.handle.raise(request(3, "left"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.current.as_ref().unwrap().id, first.alert_id);
        assert_eq!(snapshot.queued, 1);
        assert_eq!(h.tallies.primary.start_calls(), 1);
        assert_eq!(h.history.alert_count(), 2);

        h.handle.acknowledge(&first.alert_id, "nurse1").await.unwrap();
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        let current = snapshot.current.unwrap();
        assert_eq!(current.id, second.alert_id);
        assert_eq!(current.dominant_label, "left");
        assert_eq!(snapshot.queued, 0);
        assert_eq!(h.tallies.primary.start_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_does_not_stop_signaling() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::failing());
        h.handle.raise(request(0, "supine"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert!(snapshot.current.is_some());
        assert_eq!(snapshot.active_audio, Some(ChannelKind::PrimaryAudio));

        let acked = h.handle.acknowledge_current("nurse1").await.unwrap();
        assert!(acked.is_some());
        settle().await;
        assert!(h.tallies.all_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_all_silences_without_acknowledging() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        let first = h.handle.raise(request(0, "supine"));
        h.handle.raise(request(1, "supine"));
        settle().await;

        assert_eq!(h.handle.dismiss_all().await.unwrap(), 2);
        settle().await;

        assert!(h.tallies.all_quiet());
        assert_eq!(h.history.update_count(), 0);
        assert!(h.handle.snapshot().await.unwrap().current.is_none());
        assert_eq!(
            first.acknowledged().await.unwrap_err(),
            MonitorError::EscalatorClosed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_visual_retrigger_still_ends_quiet() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        h.handle.raise(request(0, "supine"));
        settle().await;
        assert!(h.tallies.visual.is_active());

        h.tallies.visual.set_failing(true);
        time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(h.tallies.visual.start_calls(), 2);
        assert!(!h.handle.snapshot().await.unwrap().visual_active);
        assert!(!h.tallies.visual.is_active());

        h.handle.acknowledge_current("nurse1").await.unwrap().unwrap();
        settle().await;
        assert!(h.tallies.all_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledgment_is_not_held_up_by_a_stalled_channel() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        h.tallies.primary.set_start_delay(Duration::from_secs(2));
        let ticket = h.handle.raise(request(0, "supine"));
        settle().await;
        assert_eq!(h.tallies.primary.start_calls(), 1);

        let asked = Instant::now();
        let acked = h.handle.acknowledge_current("nurse1").await.unwrap();
        assert!(asked.elapsed() < Duration::from_millis(100));
        assert_eq!(acked.unwrap().id, ticket.alert_id);
        assert_eq!(ticket.acknowledged().await.unwrap().status, AlertStatus::Acknowledged);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.tallies.primary.start_calls(), 1);
        assert!(h.tallies.all_quiet());
        assert!(h.handle.snapshot().await.unwrap().current.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_during_a_slow_start_does_not_cut_the_round_short() {
        let h = harness(EscalatorConfig::default(), RecordingHistory::default());
        h.tallies.primary.set_start_delay(Duration::from_millis(500));
        h.handle.raise(request(0, "supine"));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert!(snapshot.current.is_some());
        assert_eq!(snapshot.active_audio, Some(ChannelKind::PrimaryAudio));
        assert!(h.tallies.primary.is_active());
        assert!(h.tallies.visual.is_active());
    }
}
