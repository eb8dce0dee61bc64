use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ClockTick, MediaPlayer};

/// Clock state. `baseline` holds the position accumulated by earlier playing
/// stretches; while playing, `anchor` marks when the current stretch began.
#[derive(Debug, Clone)]
struct ClockState {
    baseline: f64,
    anchor: Option<Instant>,
    ended: bool,
}

impl ClockState {
    fn position(&self, duration: f64) -> f64 {
        let live = match self.anchor {
            Some(anchor) => self.baseline + anchor.elapsed().as_secs_f64(),
            None => self.baseline,
        };
        live.min(duration)
    }

    fn freeze(&mut self, duration: f64) {
        self.baseline = self.position(duration);
        self.anchor = None;
    }

    fn tick(&self, duration: f64) -> ClockTick {
        ClockTick {
            position: self.position(duration),
            paused: self.anchor.is_none(),
            ended: self.ended,
        }
    }
}

/// Headless player whose clock advances in real (or Tokio-virtual) time.
///
/// Stands in for a media element: it keeps a position, honours
/// play/pause/seek and publishes a [`ClockTick`] every `tick` while alive.
/// Must be created inside a Tokio runtime.
pub struct SimulatedPlayer {
    duration: f64,
    state: Arc<Mutex<ClockState>>,
    clock_tx: watch::Sender<ClockTick>,
    shutdown: CancellationToken,
}

impl SimulatedPlayer {
    pub fn new(duration: f64, tick: Duration) -> Self {
        let state = Arc::new(Mutex::new(ClockState {
            baseline: 0.0,
            anchor: None,
            ended: false,
        }));
        let (clock_tx, _) = watch::channel(ClockTick {
            paused: true,
            ..ClockTick::default()
        });
        let shutdown = CancellationToken::new();

        tokio::spawn(run_clock(
            duration,
            tick,
            Arc::clone(&state),
            clock_tx.clone(),
            shutdown.clone(),
        ));

        Self {
            duration,
            state,
            clock_tx,
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        lock_clock(&self.state)
    }

    fn publish(&self, state: &ClockState) {
        self.clock_tx.send_replace(state.tick(self.duration));
    }
}

impl Drop for SimulatedPlayer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl MediaPlayer for SimulatedPlayer {
    async fn probe_duration(&self) -> Result<f64> {
        Ok(self.duration)
    }

    fn position(&self) -> f64 {
        self.lock().position(self.duration)
    }

    fn is_paused(&self) -> bool {
        self.lock().anchor.is_none()
    }

    fn is_ended(&self) -> bool {
        self.lock().ended
    }

    fn play(&self) -> Result<()> {
        let mut state = self.lock();
        if state.position(self.duration) >= self.duration {
            return Err(anyhow!("playback already at end of media"));
        }
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
            state.ended = false;
        }
        self.publish(&state);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        state.freeze(self.duration);
        self.publish(&state);
    }

    fn seek(&self, position: f64) {
        let mut state = self.lock();
        state.baseline = position.clamp(0.0, self.duration);
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
        state.ended = state.baseline >= self.duration;
        self.publish(&state);
    }

    fn subscribe(&self) -> watch::Receiver<ClockTick> {
        self.clock_tx.subscribe()
    }
}

fn lock_clock(state: &Mutex<ClockState>) -> MutexGuard<'_, ClockState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn run_clock(
    duration: f64,
    tick: Duration,
    state: Arc<Mutex<ClockState>>,
    clock_tx: watch::Sender<ClockTick>,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = {
                    let mut guard = lock_clock(&state);
                    if guard.anchor.is_some() && guard.position(duration) >= duration {
                        guard.freeze(duration);
                        guard.ended = true;
                    }
                    guard.tick(duration)
                };
                clock_tx.send_replace(snapshot);
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
