//! Media playback abstraction.
//!
//! The synchronizer never polls a player. Instead it subscribes to a
//! [`ClockTick`] stream published by the player and reacts when the clock
//! crosses the current window bound.

pub mod probe;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

pub use probe::probe_duration;
pub use simulated::SimulatedPlayer;

/// Snapshot of the playback clock, pushed on every tick and state change.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockTick {
    pub position: f64,
    pub paused: bool,
    pub ended: bool,
}

#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Total media duration in seconds.
    async fn probe_duration(&self) -> Result<f64>;

    fn position(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;

    fn play(&self) -> Result<()>;
    fn pause(&self);
    fn seek(&self, position: f64);

    /// Push-based clock. Each call hands out an independent receiver.
    fn subscribe(&self) -> watch::Receiver<ClockTick>;
}
