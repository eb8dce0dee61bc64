use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::playback::{ClockTick, MediaPlayer};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

#[derive(Debug, Default)]
struct GateState {
    sync_bound: f64,
    in_flight: bool,
    paused_by_sync: bool,
}

/// What the observer must do to the player after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateAction {
    None,
    Pause,
    /// Pause (if still playing) and seek back to the bound.
    Clamp(f64),
}

/// Pacing state shared by the synchronizer and its clock observer.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    inner: Arc<Mutex<GateState>>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_bound(&self, bound: f64) {
        self.lock().sync_bound = bound;
    }

    pub fn begin_request(&self) {
        self.lock().in_flight = true;
    }

    /// Clears the outstanding request. Returns whether playback is paused
    /// only because of the bound and should resume right away.
    pub fn finish_request(&self) -> bool {
        let mut state = self.lock();
        state.in_flight = false;
        std::mem::take(&mut state.paused_by_sync)
    }

    /// Someone else resumed playback; the sync pause no longer applies.
    pub fn clear_sync_pause(&self) {
        self.lock().paused_by_sync = false;
    }

    pub fn paused_by_sync(&self) -> bool {
        self.lock().paused_by_sync
    }

    /// Decide on an action for `tick` and record a sync pause if one is taken.
    pub fn evaluate(&self, tick: &ClockTick, tolerance: f64) -> GateAction {
        let mut state = self.lock();
        if !state.in_flight || tick.position < state.sync_bound {
            return GateAction::None;
        }

        let overshoot = tick.position > state.sync_bound + tolerance;
        if !tick.paused {
            state.paused_by_sync = true;
        }
        match (overshoot, tick.paused) {
            (true, _) => GateAction::Clamp(state.sync_bound),
            (false, false) => GateAction::Pause,
            (false, true) => GateAction::None,
        }
    }
}

/// Subscription to the playback clock for the lifetime of one session.
///
/// Dropping the observer detaches it, so every exit path of the synchronizer
/// releases the subscription.
pub struct ClockObserver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ClockObserver {
    pub fn attach(player: Arc<dyn MediaPlayer>, gate: SyncGate, tolerance: f64) -> Self {
        let cancel = CancellationToken::new();
        let mut clock = player.subscribe();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = clock.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let tick = *clock.borrow_and_update();
                        apply(player.as_ref(), gate.evaluate(&tick, tolerance), &tick);
                    }
                }
            }
        });

        Self { cancel, task }
    }

    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ClockObserver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn apply(player: &dyn MediaPlayer, action: GateAction, tick: &ClockTick) {
    match action {
        GateAction::None => {}
        GateAction::Pause => {
            log_debug!("playback reached bound at {:.2}s; pausing", tick.position);
            player.pause();
        }
        GateAction::Clamp(bound) => {
            log_debug!("playback overshot to {:.2}s; clamping to {bound:.2}s", tick.position);
            if !tick.paused {
                player.pause();
            }
            player.seek(bound);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;

    use super::*;
    use crate::playback::SimulatedPlayer;

    fn tick(position: f64, paused: bool) -> ClockTick {
        ClockTick {
            position,
            paused,
            ended: false,
        }
    }

    #[test]
    fn gate_ignores_the_clock_without_a_request() {
        let gate = SyncGate::new();
        gate.set_bound(5.0);
        assert_eq!(gate.evaluate(&tick(7.0, false), 0.5), GateAction::None);
        assert!(!gate.paused_by_sync());
    }

    #[test]
    fn gate_pauses_at_bound_and_clamps_overshoot() {
        let gate = SyncGate::new();
        gate.set_bound(5.0);
        gate.begin_request();

        assert_eq!(gate.evaluate(&tick(4.9, false), 0.5), GateAction::None);
        assert_eq!(gate.evaluate(&tick(5.2, false), 0.5), GateAction::Pause);
        assert!(gate.paused_by_sync());
        assert_eq!(gate.evaluate(&tick(5.8, true), 0.5), GateAction::Clamp(5.0));

        assert!(gate.finish_request());
        assert!(!gate.finish_request());
    }

    #[test]
    fn user_pause_is_not_a_sync_pause() {
        let gate = SyncGate::new();
        gate.set_bound(5.0);
        gate.begin_request();
        assert_eq!(gate.evaluate(&tick(5.1, true), 0.5), GateAction::None);
        assert!(!gate.finish_request());
    }

    #[tokio::test(start_paused = true)]
    async fn observer_holds_playback_at_the_bound() {
        let player: Arc<dyn MediaPlayer> =
            Arc::new(SimulatedPlayer::new(20.0, Duration::from_millis(250)));
        let gate = SyncGate::new();
        gate.set_bound(5.0);
        gate.begin_request();
        let observer = ClockObserver::attach(Arc::clone(&player), gate.clone(), 0.5);

        player.play().unwrap();
        time::sleep(Duration::from_secs(8)).await;

        assert!(observer.is_attached());
        assert!(player.is_paused());
        assert!(player.position() >= 5.0 && player.position() <= 5.5);
        assert!(gate.paused_by_sync());
    }

    #[tokio::test(start_paused = true)]
    async fn observer_seeks_back_after_a_jump_past_tolerance() {
        let player: Arc<dyn MediaPlayer> =
            Arc::new(SimulatedPlayer::new(20.0, Duration::from_millis(250)));
        let gate = SyncGate::new();
        gate.set_bound(5.0);
        gate.begin_request();
        let _observer = ClockObserver::attach(Arc::clone(&player), gate.clone(), 0.5);

        player.play().unwrap();
        player.seek(9.0);
        time::sleep(Duration::from_millis(10)).await;

        assert!(player.is_paused());
        assert_eq!(player.position(), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_observer_stops_pacing() {
        let player: Arc<dyn MediaPlayer> =
            Arc::new(SimulatedPlayer::new(20.0, Duration::from_millis(250)));
        let gate = SyncGate::new();
        gate.set_bound(5.0);
        gate.begin_request();
        drop(ClockObserver::attach(Arc::clone(&player), gate.clone(), 0.5));

        player.play().unwrap();
        time::sleep(Duration::from_secs(8)).await;

        assert!(!player.is_paused());
        assert!(player.position() > 7.0);
    }
}
