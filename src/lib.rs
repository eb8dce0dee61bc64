//! Interval-synchronized video analysis with escalating no-movement alerts.
//!
//! A [`session::MonitorController`] plays a video through a
//! [`playback::MediaPlayer`] while an [`analysis::AnalysisProvider`] analyses
//! it window by window. Windows reporting no change are handed to the
//! [`alert::AlertEscalator`], which keeps signaling until someone
//! acknowledges the alert.

pub mod alert;
pub mod analysis;
pub mod audio;
pub mod error;
pub mod history;
pub mod models;
pub mod playback;
pub mod session;
pub mod settings;
pub mod summary;
pub mod utils;

pub use error::{MonitorError, MonitorResult};
pub use session::{MonitorController, SessionHandle};
pub use settings::{MonitorSettings, SettingsStore};
