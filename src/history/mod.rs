//! History collaborator: where analysis summaries and alerts end up.
//!
//! Writes are fire-and-forget from the core's point of view. [`HistoryEmitter`]
//! queues each write for a single writer task, which applies them in the order
//! they were emitted and only logs failures. A broken store can never stall the
//! synchronizer or silence an alert, and an acknowledgment can never overtake
//! the insert of its own alert.

pub mod store;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::MonitorError;
use crate::models::{AlertRecord, AlertUpdate, AnalysisRecord};

pub use store::Database;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn emit_analysis_summary(&self, record: &AnalysisRecord) -> Result<()>;
    async fn emit_alert(&self, alert: &AlertRecord) -> Result<()>;
    async fn update_alert(&self, id: &str, update: &AlertUpdate) -> Result<()>;
}

/// Sink used when no store is configured.
pub struct DiscardHistory;

#[async_trait]
impl HistorySink for DiscardHistory {
    async fn emit_analysis_summary(&self, _record: &AnalysisRecord) -> Result<()> {
        Ok(())
    }

    async fn emit_alert(&self, _alert: &AlertRecord) -> Result<()> {
        Ok(())
    }

    async fn update_alert(&self, _id: &str, _update: &AlertUpdate) -> Result<()> {
        Ok(())
    }
}

enum HistoryWrite {
    Summary(AnalysisRecord),
    Alert(AlertRecord),
    Update { id: String, update: AlertUpdate },
    Flush(oneshot::Sender<()>),
}

/// Cloneable front of the history writer task.
#[derive(Clone)]
pub struct HistoryEmitter {
    tx: mpsc::UnboundedSender<HistoryWrite>,
}

impl HistoryEmitter {
    /// Spawns the writer task; must be called inside a tokio runtime.
    pub fn new(sink: Arc<dyn HistorySink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(sink, rx));
        Self { tx }
    }

    pub fn emit_analysis_summary(&self, record: AnalysisRecord) {
        self.enqueue(HistoryWrite::Summary(record));
    }

    pub fn emit_alert(&self, alert: AlertRecord) {
        self.enqueue(HistoryWrite::Alert(alert));
    }

    pub fn update_alert(&self, id: String, update: AlertUpdate) {
        self.enqueue(HistoryWrite::Update { id, update });
    }

    /// Wait until every write emitted before this call has been attempted.
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(HistoryWrite::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }

    fn enqueue(&self, write: HistoryWrite) {
        if self.tx.send(write).is_err() {
            log_warn!("history writer is gone; dropping write");
        }
    }
}

async fn run_writer(sink: Arc<dyn HistorySink>, mut rx: mpsc::UnboundedReceiver<HistoryWrite>) {
    while let Some(write) = rx.recv().await {
        match write {
            HistoryWrite::Summary(record) => {
                if let Err(err) = sink.emit_analysis_summary(&record).await {
                    report(&record.session_id, err);
                }
            }
            HistoryWrite::Alert(alert) => {
                if let Err(err) = sink.emit_alert(&alert).await {
                    report(&alert.id, err);
                }
            }
            HistoryWrite::Update { id, update } => {
                if let Err(err) = sink.update_alert(&id, &update).await {
                    report(&id, err);
                }
            }
            HistoryWrite::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
    log_debug!("history writer stopped");
}

fn report(subject: &str, err: anyhow::Error) {
    let err = MonitorError::PersistenceFailed(format!("{err:#}"));
    log_warn!("[{subject}] {err}");
}
