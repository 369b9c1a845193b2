//! `warden-scheduler` — Tokio-based task scheduler with SQLite persistence.
//!
//! # Overview
//!
//! Tasks are persisted to a SQLite `jobs` table. The [`engine::SchedulerEngine`]
//! polls the database every second and fires any enabled task whose
//! `next_run` has arrived, updating state and computing the next scheduled
//! time. Firing forwards the task's payload over an mpsc channel for
//! delivery as a synthetic user turn — the engine has no notion of sessions
//! or channels.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                          |
//! |------------|-----------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant             |
//! | `Interval` | Repeat every N seconds                             |
//! | `Cron`     | Classical 5-field cron expression, evaluated in UTC |

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use types::{Job, JobStatus, Schedule};
