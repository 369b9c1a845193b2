//! Sub-Agent Manager — spawns short-lived worker turns that run the same
//! tool-call loop as the main conversation, at owner tier but with a
//! narrower tool set and their own round cap.
//!
//! Gated by `subagents.enabled`/`max_concurrent` (a semaphore, not just a
//! counter — a run that never returns a permit blocks new spawns rather than
//! silently over-committing). No nesting: `spawn_subagent` itself is on the
//! sub-agent-blocked list, so a worker can never spawn another worker.
//! Failures are isolated to the run record; they never propagate back into
//! the caller's own turn. Stale `running` records are swept to `failed` on
//! startup — the process that owned them is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use warden_core::types::{AccessLevel, RunId};
use warden_users::access;

use crate::pipeline::context::MessageContext;
use crate::provider::{ChatRequest, Message, Role};
use crate::tools::tool_loop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubagentRun {
    pub run_id: String,
    pub session_key: String,
    pub task: String,
    pub status: RunStatus,
    pub result: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Persists sub-agent run records so `/status`-style introspection and
/// crash recovery both have a durable source of truth.
struct SubagentStore {
    db: Mutex<Connection>,
}

impl SubagentStore {
    fn new(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS subagent_runs (
                run_id TEXT PRIMARY KEY,
                session_key TEXT NOT NULL,
                task TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
             )",
            [],
        )?;
        Ok(Self { db: Mutex::new(conn) })
    }

    fn create(&self, run_id: &str, session_key: &str, task: &str) {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        if let Err(e) = db.execute(
            "INSERT INTO subagent_runs (run_id, session_key, task, status, created_at)
             VALUES (?1, ?2, ?3, 'running', ?4)",
            rusqlite::params![run_id, session_key, task, now],
        ) {
            warn!(run_id, error = %e, "failed to persist sub-agent run record");
        }
    }

    fn complete(&self, run_id: &str, status: RunStatus, result: &str) {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let _ = db.execute(
            "UPDATE subagent_runs SET status = ?1, result = ?2, completed_at = ?3 WHERE run_id = ?4",
            rusqlite::params![status.to_string(), result, now, run_id],
        );
    }

    /// Any record still marked `running` predates this process — the task
    /// that would have completed it is gone.
    fn sweep_stale_running(&self) {
        let db = self.db.lock().unwrap();
        match db.execute(
            "UPDATE subagent_runs SET status = 'failed', result = 'bot restarted', completed_at = ?1
             WHERE status = 'running'",
            rusqlite::params![chrono::Utc::now().to_rfc3339()],
        ) {
            Ok(0) => {}
            Ok(n) => info!(count = n, "swept stale running sub-agent records to failed"),
            Err(e) => warn!(error = %e, "failed to sweep stale sub-agent records"),
        }
    }

    fn get(&self, run_id: &str) -> Option<SubagentRun> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT run_id, session_key, task, status, result, created_at, completed_at
             FROM subagent_runs WHERE run_id = ?1",
            rusqlite::params![run_id],
            |row| {
                let status_str: String = row.get(3)?;
                Ok(SubagentRun {
                    run_id: row.get(0)?,
                    session_key: row.get(1)?,
                    task: row.get(2)?,
                    status: status_str.parse().unwrap_or(RunStatus::Failed),
                    result: row.get(4)?,
                    created_at: row.get(5)?,
                    completed_at: row.get(6)?,
                })
            },
        )
        .ok()
    }
}

/// System prompt stanza appended for worker turns, naming the capability
/// boundary explicitly rather than leaving it implicit.
fn worker_privileges_stanza(denied: &[String]) -> String {
    format!(
        "You are running as a sub-agent worker spawned to complete one delegated task. \
         You operate at owner-equivalent capability for ordinary tools, but the following \
         tools are never available to you regardless of what you ask for: {}. \
         Do not attempt to spawn further sub-agents. Work the task to completion or report \
         why you could not, then stop.",
        denied.join(", ")
    )
}

/// Spawns and tracks sub-agent worker runs.
pub struct SubagentManager {
    store: SubagentStore,
    semaphore: Arc<Semaphore>,
    timeout_seconds: u64,
    max_tool_rounds: u32,
    enabled: bool,
    active: Mutex<HashMap<String, ()>>,
}

impl SubagentManager {
    pub fn new(
        conn: Connection,
        enabled: bool,
        max_concurrent: u32,
        timeout_seconds: u64,
        max_tool_rounds: u32,
    ) -> Result<Self, rusqlite::Error> {
        let store = SubagentStore::new(conn)?;
        store.sweep_stale_running();
        Ok(Self {
            store,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1) as usize)),
            timeout_seconds,
            max_tool_rounds,
            enabled,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, run_id: &str) -> Option<SubagentRun> {
        self.store.get(run_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Spawn a worker turn for `task` on a detached tokio task, returning
    /// immediately with the new run's id. The caller (the `spawn_subagent`
    /// tool) reports the id back to the model; completion is observed later
    /// via [`SubagentManager::get`] or a channel notification, not by
    /// blocking this call.
    pub async fn spawn<C: MessageContext + 'static>(
        self: &Arc<Self>,
        ctx: Arc<C>,
        session_key: String,
        task: String,
    ) -> Result<String, String> {
        if !self.enabled {
            return Err("sub-agents are disabled in config".to_string());
        }

        let permit = Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| "sub-agent concurrency limit reached — try again shortly".to_string())?;

        let run_id = RunId::new().as_str().to_string();
        self.store.create(&run_id, &session_key, &task);
        self.active.lock().unwrap().insert(run_id.clone(), ());

        let mgr = Arc::clone(self);
        let run_id2 = run_id.clone();
        let timeout = std::time::Duration::from_secs(self.timeout_seconds);
        let max_rounds = self.max_tool_rounds as usize;

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = tokio::time::timeout(timeout, run_worker(&ctx, &task, max_rounds)).await;
            let (status, result) = match outcome {
                Err(_) => (RunStatus::Failed, format!("timed out after {}s", mgr.timeout_seconds)),
                Ok(Err(e)) => (RunStatus::Failed, e),
                Ok(Ok(text)) => (RunStatus::Completed, text),
            };
            mgr.store.complete(&run_id2, status, &result);
            mgr.active.lock().unwrap().remove(&run_id2);
            info!(run_id = %run_id2, %status, "sub-agent run finished");
        });

        Ok(run_id)
    }
}

async fn run_worker<C: MessageContext + 'static>(
    ctx: &Arc<C>,
    task: &str,
    max_rounds: usize,
) -> Result<String, String> {
    let tools = crate::tools::build::build_tools(Arc::clone(ctx), "subagent", None, None, None);
    let all_defs = tools.definitions(AccessLevel::Owner);
    let allowed_names: Vec<String> =
        access::filter_tools_for_subagent(&all_defs.iter().map(|d| d.name.clone()).collect::<Vec<_>>());
    let denied_names: Vec<String> = all_defs
        .iter()
        .map(|d| d.name.clone())
        .filter(|n| !allowed_names.contains(n))
        .collect();
    let filtered_defs = all_defs
        .into_iter()
        .filter(|d| allowed_names.contains(&d.name))
        .collect();

    let prompt_builder = ctx.agent().prompt().await;
    let base_prompt = prompt_builder.build_prompt(None, None).to_plain_text();
    drop(prompt_builder);
    let system = format!("{base_prompt}\n\n{}", worker_privileges_stanza(&denied_names));

    let model = ctx.agent().get_model().await;
    let request = ChatRequest {
        model,
        system,
        system_prompt: None,
        messages: vec![Message {
            role: Role::User,
            content: task.to_string(),
        }],
        max_tokens: 4096,
        stream: false,
        thinking: None,
        tools: filtered_defs,
        raw_messages: None,
    };

    let outcome = tool_loop::run_tool_loop(
        ctx.agent().provider(),
        request,
        &tools,
        AccessLevel::Owner,
        max_rounds,
        None,
        true,
    )
    .await
    .map_err(|e| e.to_string())?;

    Ok(outcome.response.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SubagentStore {
        let conn = Connection::open_in_memory().unwrap();
        SubagentStore::new(conn).unwrap()
    }

    #[test]
    fn sweep_marks_running_as_failed() {
        let s = store();
        s.create("r1", "sk", "do a thing");
        s.sweep_stale_running();
        let rec = s.get("r1").unwrap();
        assert_eq!(rec.status, RunStatus::Failed);
        assert_eq!(rec.result.as_deref(), Some("bot restarted"));
    }

    #[test]
    fn complete_updates_status_and_result() {
        let s = store();
        s.create("r2", "sk", "do a thing");
        s.complete("r2", RunStatus::Completed, "done!");
        let rec = s.get("r2").unwrap();
        assert_eq!(rec.status, RunStatus::Completed);
        assert_eq!(rec.result.as_deref(), Some("done!"));
    }

    #[test]
    fn worker_privileges_stanza_names_denied_tools() {
        let stanza = worker_privileges_stanza(&["spawn_subagent".to_string(), "manage_user".to_string()]);
        assert!(stanza.contains("spawn_subagent"));
        assert!(stanza.contains("manage_user"));
    }
}
