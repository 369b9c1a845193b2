//! Maps the internal error taxonomy to short, non-leaky user-facing text.
//!
//! Channel adapters call this exactly once per failure; it never retries.
//! Ported from the reference evaluator's `classify_error` dispatch.

use crate::error::WardenError;

pub fn classify_error(err: &WardenError) -> String {
    match err {
        WardenError::ProviderRateLimited { retry_after_secs } => match retry_after_secs {
            Some(secs) => format!("Rate limited, please wait {secs}s before trying again."),
            None => "Rate limited, please wait a moment before trying again.".to_string(),
        },
        WardenError::AuthFailed(_) | WardenError::ProviderAuth(_) => {
            "Authentication error talking to the provider. Please check credentials.".to_string()
        }
        WardenError::ProviderBadRequest(_) => {
            "The provider rejected the request. Try /forget to reset the conversation.".to_string()
        }
        WardenError::ProviderEmptyResponse => {
            "The provider returned an empty response. Please try again.".to_string()
        }
        WardenError::ProviderOverloaded(_) => {
            "The provider is having issues right now. Try again shortly.".to_string()
        }
        WardenError::ProviderConnect(_) => {
            "Cannot connect to the provider right now. Try again shortly.".to_string()
        }
        WardenError::Timeout { .. } => "Request timed out, please try again.".to_string(),
        WardenError::DbPoolExhausted => {
            "Database connection pool exhausted, try again in a moment.".to_string()
        }
        WardenError::Database(_) => "Database error, try again in a moment.".to_string(),
        WardenError::ShapeMismatch(_) => "Unexpected response format from the provider.".to_string(),
        WardenError::ProviderNotImplemented { feature } => {
            format!("This feature ({feature}) is not supported by the current provider.")
        }
        other => format!(
            "Something went wrong ({}). Check logs for details.",
            other.code()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_includes_seconds_when_known() {
        let msg = classify_error(&WardenError::ProviderRateLimited {
            retry_after_secs: Some(12),
        });
        assert!(msg.contains("12s"));
    }

    #[test]
    fn fallback_includes_typed_code() {
        let msg = classify_error(&WardenError::Internal("boom".into()));
        assert!(msg.contains("INTERNAL_ERROR"));
    }

    #[test]
    fn auth_failure_message_is_generic() {
        let msg = classify_error(&WardenError::ProviderAuth("expired".into()));
        assert!(!msg.contains("expired"));
    }
}
