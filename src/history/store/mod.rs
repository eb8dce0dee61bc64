use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

use super::HistorySink;
use crate::models::{
    AlertRecord, AlertStatus, AlertUpdate, AnalysisRecord, IntervalWindow, PatientRef,
    SessionSummary, WindowDigest,
};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to history DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join history DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_usize(value: i64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

fn parse_status(value: &str) -> Result<AlertStatus> {
    match value {
        "Pending" => Ok(AlertStatus::Pending),
        "Acknowledged" => Ok(AlertStatus::Acknowledged),
        other => Err(anyhow!("unknown alert status {other}")),
    }
}

const ALERT_COLUMNS: &str = "id, session_id, alert_type, patient_id, patient_name, patient_room,
     file_name, interval_index, interval_start, interval_end, dominant_label,
     created_at, acknowledged_at, acknowledged_by, status";

fn alert_from_row(row: &Row<'_>) -> Result<AlertRecord> {
    Ok(AlertRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        alert_type: row.get(2)?,
        patient: PatientRef {
            id: row.get(3)?,
            name: row.get(4)?,
            room: row.get(5)?,
        },
        file_name: row.get(6)?,
        window: IntervalWindow {
            index: to_usize(row.get(7)?, "interval_index")?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
        },
        dominant_label: row.get(10)?,
        created_at: parse_datetime(&row.get::<_, String>(11)?, "created_at")?,
        acknowledged_at: row
            .get::<_, Option<String>>(12)?
            .map(|raw| parse_datetime(&raw, "acknowledged_at"))
            .transpose()?,
        acknowledged_by: row.get(13)?,
        status: parse_status(&row.get::<_, String>(14)?)?,
    })
}

/// SQLite-backed history store. All statements run on one dedicated thread;
/// callers talk to it through [`Database::execute`].
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("stillwatch-history".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("History database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("History database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let summary = &record.summary;
            conn.execute(
                "INSERT INTO analysis_history (id, session_id, created_at, patient_id, patient_name,
                     file_name, dominant_label, average_confidence, movement_detected, windows_total,
                     windows_with_change, movement_summary, summary_json, windows_json, patient_room)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    record.id,
                    record.session_id,
                    record.created_at.to_rfc3339(),
                    record.patient.id,
                    record.patient.name,
                    record.file_name,
                    summary.dominant_label,
                    summary.average_confidence,
                    summary.movement_detected,
                    to_i64(summary.total_windows)?,
                    to_i64(summary.windows_with_change)?,
                    summary.movement_summary,
                    serde_json::to_string(summary)?,
                    serde_json::to_string(&record.windows)?,
                    record.patient.room,
                ],
            )
            .with_context(|| "failed to insert analysis history")?;
            Ok(())
        })
        .await
    }

    pub async fn list_analysis_history(&self) -> Result<Vec<AnalysisRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, created_at, patient_id, patient_name, patient_room,
                        file_name, summary_json, windows_json
                 FROM analysis_history
                 ORDER BY created_at DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let summary: SessionSummary =
                    serde_json::from_str(&row.get::<_, String>(7)?)
                        .context("failed to decode stored summary")?;
                let windows: Vec<WindowDigest> =
                    serde_json::from_str(&row.get::<_, String>(8)?)
                        .context("failed to decode stored windows")?;
                records.push(AnalysisRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?, "created_at")?,
                    patient: PatientRef {
                        id: row.get(3)?,
                        name: row.get(4)?,
                        room: row.get(5)?,
                    },
                    file_name: row.get(6)?,
                    summary,
                    windows,
                });
            }
            Ok(records)
        })
        .await
    }

    pub async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        let record = alert.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO alerts (id, session_id, alert_type, patient_id, patient_name, patient_room,
                     file_name, interval_index, interval_start, interval_end, dominant_label,
                     created_at, acknowledged_at, acknowledged_by, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    record.id,
                    record.session_id,
                    record.alert_type,
                    record.patient.id,
                    record.patient.name,
                    record.patient.room,
                    record.file_name,
                    to_i64(record.window.index)?,
                    record.window.start_time,
                    record.window.end_time,
                    record.dominant_label,
                    record.created_at.to_rfc3339(),
                    record.acknowledged_at.map(|dt| dt.to_rfc3339()),
                    record.acknowledged_by,
                    record.status.as_str(),
                ],
            )
            .with_context(|| "failed to insert alert")?;
            Ok(())
        })
        .await
    }

    /// Apply an acknowledgment. An alert that is already acknowledged keeps
    /// its first acknowledgment; returns whether a row changed.
    pub async fn acknowledge_alert(&self, id: &str, update: &AlertUpdate) -> Result<bool> {
        let id = id.to_string();
        let update = update.clone();
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE alerts
                     SET status = ?1,
                         acknowledged_at = ?2,
                         acknowledged_by = ?3
                     WHERE id = ?4 AND status = 'Pending'",
                    params![
                        update.status.as_str(),
                        update.acknowledged_at.map(|dt| dt.to_rfc3339()),
                        update.acknowledged_by,
                        id,
                    ],
                )
                .with_context(|| "failed to update alert")?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn get_alert(&self, id: &str) -> Result<Option<AlertRecord>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(alert_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<AlertRecord>> {
        self.execute(move |conn| {
            let mut alerts = Vec::new();
            match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = ?1 ORDER BY created_at DESC"
                    ))?;
                    let mut rows = stmt.query(params![status.as_str()])?;
                    while let Some(row) = rows.next()? {
                        alerts.push(alert_from_row(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC"
                    ))?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        alerts.push(alert_from_row(row)?);
                    }
                }
            }
            Ok(alerts)
        })
        .await
    }
}

#[async_trait]
impl HistorySink for Database {
    async fn emit_analysis_summary(&self, record: &AnalysisRecord) -> Result<()> {
        self.insert_analysis(record).await
    }

    async fn emit_alert(&self, alert: &AlertRecord) -> Result<()> {
        self.insert_alert(alert).await
    }

    async fn update_alert(&self, id: &str, update: &AlertUpdate) -> Result<()> {
        if !self.acknowledge_alert(id, update).await? {
            log::info!("Alert {id} was already acknowledged or is unknown; keeping first acknowledgment");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::models::{LabelShare, NO_MOVEMENT_ALERT};

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("history").join("stillwatch.sqlite3")).unwrap();
        (dir, db)
    }

    fn alert(id: &str, created_at: DateTime<Utc>) -> AlertRecord {
        AlertRecord {
            id: id.into(),
            session_id: "s1".into(),
            alert_type: NO_MOVEMENT_ALERT.into(),
            window: IntervalWindow {
                index: 1,
                start_time: 5.0,
                end_time: 10.0,
            },
            dominant_label: "supine".into(),
            patient: PatientRef {
                id: "P-7".into(),
                name: "Ada".into(),
                room: Some("12B".into()),
            },
            file_name: "ward.mp4".into(),
            created_at,
            acknowledged_at: None,
            acknowledged_by: None,
            status: AlertStatus::Pending,
        }
    }

    #[tokio::test]
    async fn alert_round_trips_through_the_store() {
        let (_dir, db) = open();
        let record = alert("a1", Utc::now());
        db.insert_alert(&record).await.unwrap();

        let stored = db.get_alert("a1").await.unwrap().unwrap();
        assert_eq!(stored.window, record.window);
        assert_eq!(stored.patient.room.as_deref(), Some("12B"));
        assert_eq!(stored.status, AlertStatus::Pending);
        assert!(db.get_alert("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_acknowledgment_is_never_overwritten() {
        let (_dir, db) = open();
        db.insert_alert(&alert("a1", Utc::now())).await.unwrap();

        let mut first = alert("a1", Utc::now());
        first.acknowledge("nurse1", Utc::now());
        assert!(db.acknowledge_alert("a1", &first.update()).await.unwrap());

        let mut second = alert("a1", Utc::now());
        second.acknowledge("nurse2", Utc::now());
        assert!(!db.acknowledge_alert("a1", &second.update()).await.unwrap());

        let stored = db.get_alert("a1").await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Acknowledged);
        assert_eq!(stored.acknowledged_by.as_deref(), Some("nurse1"));
    }

    #[tokio::test]
    async fn alerts_filter_by_status_newest_first() {
        let (_dir, db) = open();
        let now = Utc::now();
        db.insert_alert(&alert("old", now - ChronoDuration::minutes(5)))
            .await
            .unwrap();
        db.insert_alert(&alert("new", now)).await.unwrap();

        let mut acked = alert("old", now);
        acked.acknowledge("nurse1", now);
        db.update_alert("old", &acked.update()).await.unwrap();

        let all = db.list_alerts(None).await.unwrap();
        assert_eq!(
            all.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["new", "old"]
        );
        let pending = db.list_alerts(Some(AlertStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "new");
    }

    #[tokio::test]
    async fn analysis_history_keeps_summary_and_windows() {
        let (_dir, db) = open();
        let record = AnalysisRecord {
            id: "h1".into(),
            session_id: "s1".into(),
            patient: PatientRef {
                id: "P-7".into(),
                name: "Ada".into(),
                room: Some("12B".into()),
            },
            file_name: "ward.mp4".into(),
            created_at: Utc::now(),
            summary: SessionSummary {
                dominant_label: "supine".into(),
                average_confidence: 0.82,
                labels: vec![LabelShare {
                    label: "supine".into(),
                    count: 4,
                    probability: 1.0,
                }],
                movement_detected: false,
                windows_with_change: 0,
                total_windows: 2,
                frames_processed: 4,
                interval_secs: 5.0,
                movement_summary: "No movement detected throughout video".into(),
            },
            windows: vec![WindowDigest {
                start: 0.0,
                end: 5.0,
                label: "supine".into(),
                changed: false,
            }],
        };

        db.emit_analysis_summary(&record).await.unwrap();
        let history = db.list_analysis_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].summary, record.summary);
        assert_eq!(history[0].windows, record.windows);
        assert_eq!(history[0].patient, record.patient);
    }
}
