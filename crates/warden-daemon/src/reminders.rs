//! Translates fired scheduler `Job`s into channel deliveries.
//!
//! The scheduler knows nothing about channels or sessions — it just fires a
//! `Job` with an opaque payload. This task parses that payload back into a
//! `ReminderAction`, works out which channel owns the session, and forwards
//! a `ReminderDelivery` to that channel's delivery queue.

use tokio::sync::mpsc;
use tracing::warn;

use warden_core::reminder::{ReminderAction, ReminderDelivery};
use warden_scheduler::Job;

/// Channel-scoped session keys look like `user:{uid}:{channel}:{rest}`.
/// Telegram's `rest` is `private_{id}` or `group_{id}[:{thread}]` — the
/// leading numeric id is the chat to deliver to.
fn route(session_key: &str) -> (Option<String>, Option<u64>) {
    let mut parts = session_key.splitn(4, ':');
    let (Some(_user_tag), Some(_uid), Some(channel), Some(rest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return (None, None);
    };

    let id_part = rest.split(':').next().unwrap_or("");
    let numeric = id_part
        .trim_start_matches("private_")
        .trim_start_matches("group_");
    // Telegram group chat ids are negative i64s; round-trip them through u64
    // bit patterns so `(channel_id as u64) as i64` recovers the original.
    let channel_id = numeric.parse::<i64>().ok().map(|v| v as u64);

    (Some(channel.to_string()), channel_id)
}

/// Runs for the daemon's lifetime. Receives every fired `Job` from the
/// scheduler engine and forwards reminder payloads to `telegram_tx`.
///
/// Reminders whose session belongs to a channel with no registered delivery
/// sender (e.g. a CLI REPL that isn't currently attached) are logged and
/// dropped — there's nothing live to push them to.
pub async fn run_reminder_router(
    mut fired_rx: mpsc::Receiver<Job>,
    telegram_tx: Option<mpsc::Sender<ReminderDelivery>>,
) {
    while let Some(job) = fired_rx.recv().await {
        if job.name != "reminder" {
            continue;
        }

        let action: ReminderAction = match serde_json::from_str(&job.payload) {
            Ok(a) => a,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "reminder job payload is not valid ReminderAction JSON");
                continue;
            }
        };

        let (channel, channel_id) = route(&action.session_key);
        let delivery = ReminderDelivery {
            job_id: job.id.clone(),
            session_key: action.session_key.clone(),
            message: action.message,
            image_url: action.image_url,
            channel_id,
        };

        match channel.as_deref() {
            Some("telegram") => match &telegram_tx {
                Some(tx) => {
                    if tx.try_send(delivery).is_err() {
                        warn!(job_id = %job.id, "telegram delivery queue full or closed — reminder dropped");
                    }
                }
                None => warn!(job_id = %job.id, "reminder targets telegram but no adapter is running"),
            },
            Some(other) => {
                warn!(job_id = %job.id, channel = other, "no delivery route for this channel — reminder dropped");
            }
            None => {
                warn!(job_id = %job.id, session_key = %delivery.session_key, "could not parse channel from session key");
            }
        }
    }
}
