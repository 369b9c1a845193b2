use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    schedule::{compute_next_run, validate},
    types::{Job, JobStatus, Schedule},
};

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let sched_json: String = row.get(2)?;
    let status_str: String = row.get(5)?;
    let schedule: Schedule = serde_json::from_str(&sched_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        schedule,
        payload: row.get(3)?,
        enabled: row.get::<_, i64>(4)? != 0,
        status: status_str.parse().unwrap_or(JobStatus::Pending),
        created_by: row.get(6)?,
        last_run: row.get(7)?,
        next_run: row.get(8)?,
        run_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const SELECT_COLUMNS: &str = "id, name, schedule, payload, enabled, status, created_by,
                               last_run, next_run, run_count, created_at, updated_at";

fn insert_job(
    conn: &Connection,
    name: &str,
    schedule: &Schedule,
    payload: &str,
    created_by: Option<&str>,
) -> Result<Job> {
    validate(schedule).map_err(SchedulerError::InvalidSchedule)?;

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let next = compute_next_run(schedule, now).map(|dt| dt.to_rfc3339());
    let id = Uuid::new_v4().to_string();
    let schedule_json =
        serde_json::to_string(schedule).map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;

    conn.execute(
        "INSERT INTO jobs
         (id, name, schedule, payload, enabled, status, created_by, last_run, next_run,
          run_count, created_at, updated_at)
         VALUES (?1,?2,?3,?4,1,'pending',?5,NULL,?6,0,?7,?7)",
        rusqlite::params![id, name, schedule_json, payload, created_by, next, now_str],
    )?;

    info!(job_id = %id, %name, "task created");
    Ok(Job {
        id,
        name: name.to_string(),
        schedule: schedule.clone(),
        payload: payload.to_string(),
        enabled: true,
        status: JobStatus::Pending,
        created_by: created_by.map(str::to_string),
        last_run: None,
        next_run: next,
        run_count: 0,
        created_at: now_str.clone(),
        updated_at: now_str,
    })
}

fn list_jobs(conn: &Connection) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM jobs ORDER BY created_at"))?;
    let jobs = stmt.query_map([], row_to_job)?.filter_map(|r| r.ok()).collect();
    Ok(jobs)
}

fn get_job(conn: &Connection, id: &str) -> Result<Job> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?1"),
        [id],
        row_to_job,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => SchedulerError::JobNotFound { id: id.to_string() },
        other => SchedulerError::Database(other),
    })
}

fn get_job_by_name(conn: &Connection, name: &str) -> Result<Job> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE name = ?1"),
        [name],
        row_to_job,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => SchedulerError::JobNotFound { id: name.to_string() },
        other => SchedulerError::Database(other),
    })
}

fn delete_job(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
    if n == 0 {
        return Err(SchedulerError::JobNotFound { id: id.to_string() });
    }
    info!(job_id = %id, "task deleted");
    Ok(())
}

fn delete_job_by_name(conn: &Connection, name: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM jobs WHERE name = ?1", [name])?;
    if n == 0 {
        return Err(SchedulerError::JobNotFound { id: name.to_string() });
    }
    info!(%name, "task deleted by name");
    Ok(())
}

fn set_enabled(conn: &Connection, id: &str, enabled: bool) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE jobs SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![enabled as i64, now, id],
    )?;
    if n == 0 {
        return Err(SchedulerError::JobNotFound { id: id.to_string() });
    }
    Ok(())
}

/// Shared handle for task management (create/list/delete/enable/disable)
/// while the engine loop runs independently.
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn create_task(
        &self,
        name: &str,
        schedule: Schedule,
        payload: &str,
        created_by: Option<&str>,
    ) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        insert_job(&conn, name, &schedule, payload, created_by)
    }

    pub fn get_task(&self, id: &str) -> Result<Job> {
        get_job(&self.conn.lock().unwrap(), id)
    }

    pub fn get_task_by_name(&self, name: &str) -> Result<Job> {
        get_job_by_name(&self.conn.lock().unwrap(), name)
    }

    pub fn list_tasks(&self) -> Result<Vec<Job>> {
        list_jobs(&self.conn.lock().unwrap())
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        delete_job(&self.conn.lock().unwrap(), id)
    }

    pub fn delete_task_by_name(&self, name: &str) -> Result<()> {
        delete_job_by_name(&self.conn.lock().unwrap(), name)
    }

    pub fn enable_task(&self, id: &str) -> Result<()> {
        set_enabled(&self.conn.lock().unwrap(), id, true)
    }

    pub fn disable_task(&self, id: &str) -> Result<()> {
        set_enabled(&self.conn.lock().unwrap(), id, false)
    }
}

/// Core scheduler: persists tasks to SQLite and drives execution at ±1 s
/// precision. When a task fires, its payload is forwarded through
/// `fired_tx` for delivery as a synthetic user turn into the owning
/// session — the engine itself knows nothing about channels or sessions.
pub struct SchedulerEngine {
    conn: Connection,
    fired_tx: Option<mpsc::Sender<Job>>,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the DB schema if needed.
    ///
    /// Pass `Some(tx)` to receive a copy of every fired [`Job`] via mpsc.
    /// The sender is non-blocking (`try_send`) so the tick loop is never stalled.
    pub fn new(conn: Connection, fired_tx: Option<mpsc::Sender<Job>>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn, fired_tx })
    }

    pub fn create_task(
        &self,
        name: &str,
        schedule: Schedule,
        payload: &str,
        created_by: Option<&str>,
    ) -> Result<Job> {
        insert_job(&self.conn, name, &schedule, payload, created_by)
    }

    pub fn get_task(&self, id: &str) -> Result<Job> {
        get_job(&self.conn, id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Job>> {
        list_jobs(&self.conn)
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        delete_job(&self.conn, id)
    }

    pub fn delete_task_by_name(&self, name: &str) -> Result<()> {
        delete_job_by_name(&self.conn, name)
    }

    pub fn enable_task(&self, id: &str) -> Result<()> {
        set_enabled(&self.conn, id, true)
    }

    pub fn disable_task(&self, id: &str) -> Result<()> {
        set_enabled(&self.conn, id, false)
    }

    /// Main event loop. Polls every second until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.mark_missed_on_startup();

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    /// On startup, mark any enabled pending task whose next_run is in the
    /// past as Missed — the process was offline through its firing window.
    fn mark_missed_on_startup(&mut self) {
        let now = Utc::now().to_rfc3339();
        match self.conn.execute(
            "UPDATE jobs SET status = 'missed', updated_at = ?1
             WHERE status = 'pending' AND enabled = 1
               AND next_run IS NOT NULL AND next_run < ?1",
            [&now],
        ) {
            Ok(n) if n > 0 => warn!(count = n, "tasks marked missed on startup"),
            Err(e) => error!("missed-on-startup query failed: {e}"),
            _ => {}
        }
    }

    /// Process all enabled tasks whose next_run has arrived.
    fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        // Collect eagerly inside the block so `stmt` is dropped before we
        // borrow `self.conn` again for the UPDATE below.
        let due: Vec<(String, String, String, String)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT id, name, schedule, payload FROM jobs
                 WHERE status = 'pending' AND enabled = 1
                   AND next_run IS NOT NULL AND next_run <= ?1",
            )?;
            let rows: Vec<_> = stmt
                .query_map([&now_str], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for (id, name, sched_json, _payload) in due {
            let schedule: Schedule = match serde_json::from_str(&sched_json) {
                Ok(s) => s,
                Err(e) => {
                    error!(job_id = %id, "bad schedule JSON: {e}");
                    continue;
                }
            };

            let run_count: u32 = self.conn.query_row(
                "SELECT run_count FROM jobs WHERE id = ?1",
                [&id],
                |row| row.get(0),
            )?;
            let new_count = run_count + 1;
            let next = compute_next_run(&schedule, now).map(|dt| dt.to_rfc3339());
            let new_status = if next.is_none() { "completed" } else { "pending" };

            info!(job_id = %id, %name, run = new_count, next_status = %new_status, "firing task");

            self.conn.execute(
                "UPDATE jobs SET status=?1, last_run=?2, next_run=?3,
                  run_count=?4, updated_at=?2
                 WHERE id=?5",
                rusqlite::params![new_status, now_str, next, new_count, id],
            )?;

            if let Some(ref tx) = self.fired_tx {
                match get_job(&self.conn, &id) {
                    Ok(fired) => {
                        if tx.try_send(fired).is_err() {
                            warn!(job_id = %id, "delivery channel full or closed — task dropped");
                        }
                    }
                    Err(e) => error!(job_id = %id, "failed to reload fired task: {e}"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> SchedulerEngine {
        let conn = Connection::open_in_memory().unwrap();
        SchedulerEngine::new(conn, None).unwrap()
    }

    #[test]
    fn create_list_delete_roundtrip() {
        let engine = test_engine();
        let job = engine
            .create_task("reminder", Schedule::Interval { every_secs: 3600 }, "drink water", Some("u1"))
            .unwrap();
        assert_eq!(engine.list_tasks().unwrap().len(), 1);
        engine.delete_task(&job.id).unwrap();
        assert!(engine.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn delete_missing_task_errors() {
        let engine = test_engine();
        assert!(matches!(engine.delete_task("missing"), Err(SchedulerError::JobNotFound { .. })));
    }

    #[test]
    fn disable_then_enable_toggles_eligibility() {
        let engine = test_engine();
        let job = engine
            .create_task("daily-standup", Schedule::Cron { expression: "0 9 * * *".to_string() }, "stand up", None)
            .unwrap();
        engine.disable_task(&job.id).unwrap();
        assert!(!engine.get_task(&job.id).unwrap().enabled);
        engine.enable_task(&job.id).unwrap();
        assert!(engine.get_task(&job.id).unwrap().enabled);
    }

    #[test]
    fn invalid_schedule_rejected_at_creation() {
        let engine = test_engine();
        let err = engine.create_task("bad", Schedule::Interval { every_secs: 0 }, "x", None).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }

    #[tokio::test]
    async fn tick_fires_due_interval_task_and_reschedules() {
        let conn = Connection::open_in_memory().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let mut engine = SchedulerEngine::new(conn, Some(tx)).unwrap();
        let job = engine
            .create_task("ping", Schedule::Once { at: Utc::now() - chrono::Duration::seconds(1) }, "ping!", None)
            .unwrap();

        engine.tick().unwrap();

        let fired = rx.try_recv().expect("task should have fired");
        assert_eq!(fired.id, job.id);
        assert_eq!(fired.payload, "ping!");

        let reloaded = engine.get_task(&job.id).unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.run_count, 1);
    }
}
