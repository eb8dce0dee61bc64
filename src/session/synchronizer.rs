//! Interval-paced playback/analysis driver.
//!
//! Windows are analysed strictly in order with at most one request in flight.
//! Playback runs ahead while a request is outstanding only up to the end of
//! the window being analysed: the [`ClockObserver`] pauses it there and the
//! synchronizer resumes it as soon as the result arrives. Unchanged windows
//! are handed to the escalator without waiting on the alert.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::observer::{ClockObserver, SyncGate};
use super::state::{IntervalStage, SessionPhase};
use super::MediaSession;
use crate::alert::{AlertRequest, EscalatorHandle};
use crate::analysis::{AnalysisProvider, AnalysisRequest};
use crate::error::{MonitorError, MonitorResult};
use crate::history::HistoryEmitter;
use crate::models::{
    plan_windows, AnalysisRecord, IntervalResult, IntervalWindow, ProgressEvent, SessionEvent,
    SessionSummary, WindowDigest, DEFAULT_INTERVAL_SECS,
};
use crate::settings::MonitorSettings;
use crate::summary::compile_summary;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizerConfig {
    pub interval_secs: f64,
    pub drift_tolerance_secs: f64,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            drift_tolerance_secs: 0.5,
        }
    }
}

impl From<&MonitorSettings> for SynchronizerConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            interval_secs: settings.interval_secs,
            drift_tolerance_secs: settings.drift_tolerance_secs,
        }
    }
}

/// Outcome of one session run.
///
/// `results` holds every window analysed before the session ended, even on
/// failure; `summary` is only set for completed sessions.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub phase: SessionPhase,
    pub results: Vec<IntervalResult>,
    pub summary: Option<SessionSummary>,
    pub alert_ids: Vec<String>,
    pub error: Option<MonitorError>,
}

pub struct PlaybackSynchronizer {
    provider: Arc<dyn AnalysisProvider>,
    escalator: EscalatorHandle,
    history: HistoryEmitter,
    config: SynchronizerConfig,
}

impl PlaybackSynchronizer {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        escalator: EscalatorHandle,
        history: HistoryEmitter,
        config: SynchronizerConfig,
    ) -> Self {
        Self {
            provider,
            escalator,
            history,
            config,
        }
    }

    /// Drive `session` to a terminal phase. Exactly one terminal event is
    /// sent on `events`, and playback is left paused on every exit path.
    pub async fn run(
        &self,
        mut session: MediaSession,
        events: mpsc::UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> SessionReport {
        let outcome = self.drive(&mut session, &events, &cancel).await;
        session.player.pause();

        let (summary, error) = match outcome {
            Ok(summary) => {
                session.enter(SessionPhase::Completed);
                log_info!(
                    "[{}] session completed: {}",
                    session.id,
                    summary.movement_summary
                );
                let _ = events.send(SessionEvent::Completed {
                    summary: summary.clone(),
                });
                (Some(summary), None)
            }
            Err(MonitorError::Cancelled) => {
                session.enter(SessionPhase::Cancelled);
                log_info!(
                    "[{}] session cancelled after {} window(s)",
                    session.id,
                    session.results.len()
                );
                let _ = events.send(SessionEvent::Cancelled);
                (None, Some(MonitorError::Cancelled))
            }
            Err(err) => {
                session.enter(SessionPhase::Failed);
                log_warn!("[{}] session failed: {err}", session.id);
                let _ = events.send(SessionEvent::Failed {
                    error: err.to_string(),
                });
                (None, Some(err))
            }
        };

        SessionReport {
            session_id: session.id,
            phase: session.phase,
            results: session.results,
            summary,
            alert_ids: session.alert_ids,
            error,
        }
    }

    async fn drive(
        &self,
        session: &mut MediaSession,
        events: &mpsc::UnboundedSender<SessionEvent>,
        cancel: &CancellationToken,
    ) -> MonitorResult<SessionSummary> {
        session.enter(SessionPhase::Priming);
        let probed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
            probed = session.player.probe_duration() => probed,
        };
        session.duration =
            probed.map_err(|e| MonitorError::InvalidMedia(format!("{e:#}")))?;
        let windows = plan_windows(session.duration, self.config.interval_secs)?;
        let total = windows.len();
        log_info!(
            "[{}] {} ({:.1}s) split into {} window(s)",
            session.id,
            session.media.file_name,
            session.duration,
            total
        );

        let gate = SyncGate::new();
        let observer = ClockObserver::attach(
            Arc::clone(&session.player),
            gate.clone(),
            self.config.drift_tolerance_secs,
        );

        session.player.seek(0.0);
        session
            .player
            .play()
            .map_err(|e| MonitorError::InvalidMedia(format!("{e:#}")))?;

        for window in windows {
            session.current_index = window.index;
            let last = window.index + 1 == total;
            session.enter(if last {
                SessionPhase::Draining
            } else {
                SessionPhase::Running(IntervalStage::AwaitingPlaybackReachStart)
            });

            gate.set_bound(window.end_time);
            if window.index > 0 && session.player.is_paused() {
                resume(session);
                gate.clear_sync_pause();
            }
            self.await_window_start(session, &window, cancel).await?;

            if !last {
                session.enter(SessionPhase::Running(IntervalStage::AnalyzingWindow));
            }
            gate.begin_request();
            let _ = events.send(SessionEvent::Progress(ProgressEvent {
                interval_index: window.index,
                total_intervals: total,
                start_time: window.start_time,
                end_time: window.end_time,
                percent: (window.index + 1) as f64 / total as f64 * 100.0,
            }));
            log_debug!("[{}] analysing {}", session.id, window.label());

            let request = AnalysisRequest {
                media: session.media.clone(),
                window,
            };
            let analysis = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(MonitorError::Cancelled),
                analysis = self.provider.analyze(request) => analysis,
            };

            if gate.finish_request() {
                resume(session);
            }
            let result = analysis?.into_result(window);

            if !result.changed {
                let alert_id = self.raise_alert(session, &result);
                let _ = events.send(SessionEvent::AlertRaised {
                    alert_id,
                    interval_index: window.index,
                });
            }
            session.results.push(result);
        }

        drop(observer);
        session.player.pause();

        let summary = compile_summary(&session.results, self.config.interval_secs)?;
        self.history.emit_analysis_summary(AnalysisRecord {
            id: format!("analysis_{}", Uuid::new_v4()),
            session_id: session.id.clone(),
            patient: session.patient.clone(),
            file_name: session.media.file_name.clone(),
            created_at: Utc::now(),
            summary: summary.clone(),
            windows: session.results.iter().map(WindowDigest::from).collect(),
        });
        Ok(summary)
    }

    /// Wait until the clock reaches the window start. Returns immediately
    /// when playback already sits at or past it, or when media has ended.
    async fn await_window_start(
        &self,
        session: &MediaSession,
        window: &IntervalWindow,
        cancel: &CancellationToken,
    ) -> MonitorResult<()> {
        let mut clock = session.player.subscribe();
        let start = window.start_time;
        let reached = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
            reached = clock.wait_for(|tick| tick.ended || tick.position >= start) => reached.is_ok(),
        };
        if !reached {
            return Err(MonitorError::InvalidMedia(
                "playback clock stopped before the window start".into(),
            ));
        }
        Ok(())
    }

    fn raise_alert(&self, session: &mut MediaSession, result: &IntervalResult) -> String {
        let ticket = self.escalator.raise(AlertRequest {
            session_id: session.id.clone(),
            window: result.window,
            dominant_label: result.dominant_label.clone(),
            patient: session.patient.clone(),
            file_name: session.media.file_name.clone(),
        });
        session.alert_ids.push(ticket.alert_id.clone());
        ticket.alert_id
    }
}

fn resume(session: &MediaSession) {
    if let Err(err) = session.player.play() {
        log_debug!("[{}] playback not resumed: {err:#}", session.id);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::analysis::WindowAnalysis;
    use crate::models::FramePrediction;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum Scripted {
        Unchanged(&'static str),
        Fail(&'static str),
        Empty,
    }

    /// Provider that records call order and concurrency depth. Windows
    /// without a script entry report movement.
    #[derive(Default)]
    pub struct RecordingProvider {
        pub delay: Duration,
        pub script: HashMap<usize, Scripted>,
        pub calls: Mutex<Vec<usize>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl RecordingProvider {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn with(mut self, index: usize, outcome: Scripted) -> Self {
            self.script.insert(index, outcome);
            self
        }

        pub fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    fn frames(label: &str, window: &IntervalWindow) -> Vec<FramePrediction> {
        (0..3)
            .map(|i| FramePrediction {
                timestamp: window.start_time + i as f64,
                label: label.to_string(),
                confidence: 0.8,
            })
            .collect()
    }

    #[async_trait]
    impl AnalysisProvider for RecordingProvider {
        async fn analyze(&self, request: AnalysisRequest) -> MonitorResult<WindowAnalysis> {
            let index = request.window.index;
            self.calls.lock().unwrap().push(index);
            let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(depth, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.script.get(&index) {
                Some(Scripted::Fail(message)) => {
                    Err(MonitorError::AnalysisRequestFailed(message.to_string()))
                }
                Some(Scripted::Unchanged(label)) => Ok(WindowAnalysis {
                    per_frame: frames(label, &request.window),
                    dominant_label: Some(label.to_string()),
                    changed: false,
                }),
                Some(Scripted::Empty) => Ok(WindowAnalysis {
                    per_frame: Vec::new(),
                    dominant_label: None,
                    changed: true,
                }),
                None => Ok(WindowAnalysis {
                    per_frame: frames("left", &request.window),
                    dominant_label: None,
                    changed: true,
                }),
            }
        }
    }
}
