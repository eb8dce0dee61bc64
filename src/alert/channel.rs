use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::MonitorResult;
use crate::models::ChannelKind;

/// One way of getting a human's attention.
///
/// `start` (re)triggers the signal and reports failure immediately so the
/// escalator can fall back. `stop` must return the channel's resource to its
/// pre-alert state whatever happened before.
#[async_trait]
pub trait AlertChannel: Send {
    fn kind(&self) -> ChannelKind;
    async fn start(&mut self) -> MonitorResult<()>;
    async fn stop(&mut self);
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulseState {
    #[default]
    Idle,
    /// `beat` increments on every re-trigger so observers can animate.
    Pulsing { beat: u64 },
}

/// Visual cue published on a watch channel for whatever renders the UI.
pub struct VisualPulse {
    tx: watch::Sender<PulseState>,
    restore_to: Option<PulseState>,
    beat: u64,
}

impl VisualPulse {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PulseState::Idle);
        Self {
            tx,
            restore_to: None,
            beat: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PulseState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> PulseState {
        *self.tx.borrow()
    }
}

impl Default for VisualPulse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertChannel for VisualPulse {
    fn kind(&self) -> ChannelKind {
        ChannelKind::VisualPulse
    }

    async fn start(&mut self) -> MonitorResult<()> {
        if self.restore_to.is_none() {
            self.restore_to = Some(self.state());
        }
        self.beat += 1;
        self.tx.send_replace(PulseState::Pulsing { beat: self.beat });
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(previous) = self.restore_to.take() {
            self.tx.send_replace(previous);
        }
    }

    fn is_active(&self) -> bool {
        self.restore_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pulse_restores_pre_alert_state() {
        let mut pulse = VisualPulse::new();
        let observer = pulse.subscribe();

        pulse.start().await.unwrap();
        pulse.start().await.unwrap();
        assert_eq!(*observer.borrow(), PulseState::Pulsing { beat: 2 });
        assert!(pulse.is_active());

        pulse.stop().await;
        assert_eq!(*observer.borrow(), PulseState::Idle);
        assert!(!pulse.is_active());

        pulse.stop().await;
        assert_eq!(pulse.state(), PulseState::Idle);
    }
}
