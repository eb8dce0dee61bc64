//! Escalating no-movement alerts.
//!
//! The [`AlertEscalator`] owns every alert from creation to acknowledgment and
//! drives the signal channels; callers only hold an [`EscalatorHandle`].

pub mod channel;
pub mod escalator;
pub mod surface;

pub use channel::{AlertChannel, PulseState, VisualPulse};
pub use escalator::{
    AlertEscalator, AlertRequest, AlertTicket, EscalatorConfig, EscalatorHandle,
    EscalatorSnapshot, SignalChannels,
};
pub use surface::{AcknowledgmentSurface, EventSurface, SurfaceEvent};
