use tokio::sync::broadcast;

use crate::models::AlertPrompt;

/// Where the "acknowledge" prompt is shown. Showing it must not block; the
/// user's answer comes back through `EscalatorHandle::acknowledge`.
pub trait AcknowledgmentSurface: Send + Sync {
    fn present(&self, prompt: &AlertPrompt);
    fn dismiss(&self, alert_id: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Presented(AlertPrompt),
    Dismissed { alert_id: String },
}

/// Publishes surface changes to any number of listeners (UI bridge, CLI).
#[derive(Clone)]
pub struct EventSurface {
    tx: broadcast::Sender<SurfaceEvent>,
}

impl EventSurface {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl AcknowledgmentSurface for EventSurface {
    fn present(&self, prompt: &AlertPrompt) {
        // No listener yet is fine; the escalator keeps signaling regardless.
        let _ = self.tx.send(SurfaceEvent::Presented(prompt.clone()));
    }

    fn dismiss(&self, alert_id: &str) {
        let _ = self.tx.send(SurfaceEvent::Dismissed {
            alert_id: alert_id.to_string(),
        });
    }
}
