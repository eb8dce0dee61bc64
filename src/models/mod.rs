pub mod alert;
pub mod analysis;
pub mod session;
pub mod window;

pub use alert::{
    AlertPrompt, AlertRecord, AlertStatus, AlertUpdate, ChannelKind, NO_MOVEMENT_ALERT,
};
pub use analysis::{
    dominant_label, AnalysisRecord, FramePrediction, IntervalResult, LabelShare, SessionSummary,
    WindowDigest,
};
pub use session::{PatientRef, ProgressEvent, SessionEvent};
pub use window::{interval_count, plan_windows, window_at, IntervalWindow, DEFAULT_INTERVAL_SECS};
