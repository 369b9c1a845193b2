use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::types::Schedule;

/// Compute the next UTC execution time for `schedule` starting *after* `from`.
///
/// Returns `None` when the schedule is exhausted (e.g. a `Once` task whose
/// time has already passed) or when the cron expression fails to parse
/// (parsing errors fail closed — the task simply never fires again).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }

        Schedule::Interval { every_secs } => Some(from + Duration::seconds(*every_secs as i64)),

        Schedule::Cron { expression } => match parse_cron(expression) {
            Ok(sched) => sched.after(&from).next(),
            Err(e) => {
                warn!(expression, "invalid cron expression: {e}");
                None
            }
        },
    }
}

/// Validate a schedule definition eagerly, at creation time, so a malformed
/// cron expression or non-positive interval is rejected before it is
/// persisted rather than silently never firing.
pub fn validate(schedule: &Schedule) -> Result<(), String> {
    match schedule {
        Schedule::Once { .. } => Ok(()),
        Schedule::Interval { every_secs } => {
            if *every_secs == 0 {
                Err("interval must be greater than zero seconds".to_string())
            } else {
                Ok(())
            }
        }
        Schedule::Cron { expression } => parse_cron(expression).map(|_| ()).map_err(|e| e.to_string()),
    }
}

/// The `cron` crate expects a leading seconds field; the classical 5-field
/// form (minute hour day-of-month month day-of-week) is what both spec and
/// users write, so prepend `"0 "` before delegating to it.
fn parse_cron(expression: &str) -> Result<cron::Schedule, cron::error::Error> {
    let fields = expression.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    cron::Schedule::from_str(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_in_future_fires() {
        let now = Utc::now();
        let at = now + Duration::seconds(60);
        let sched = Schedule::Once { at };
        assert_eq!(compute_next_run(&sched, now), Some(at));
    }

    #[test]
    fn once_in_past_is_exhausted() {
        let now = Utc::now();
        let at = now - Duration::seconds(60);
        let sched = Schedule::Once { at };
        assert_eq!(compute_next_run(&sched, now), None);
    }

    #[test]
    fn interval_advances_by_fixed_amount() {
        let now = Utc::now();
        let sched = Schedule::Interval { every_secs: 3600 };
        let next = compute_next_run(&sched, now).unwrap();
        assert_eq!((next - now).num_seconds(), 3600);
    }

    #[test]
    fn five_field_cron_parses() {
        let sched = Schedule::Cron {
            expression: "0 9 * * *".to_string(),
        };
        assert!(validate(&sched).is_ok());
        let now = Utc::now();
        assert!(compute_next_run(&sched, now).is_some());
    }

    #[test]
    fn malformed_cron_fails_validation() {
        let sched = Schedule::Cron {
            expression: "not a cron expr".to_string(),
        };
        assert!(validate(&sched).is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let sched = Schedule::Interval { every_secs: 0 };
        assert!(validate(&sched).is_err());
    }
}
