//! Telegram context interface — re-exported from the shared pipeline.
//!
//! `TelegramAppContext` is an alias for `warden_agent::pipeline::MessageContext`.
//! All channel adapters share the same trait, defined once in `warden-agent`.

pub use warden_agent::pipeline::MessageContext as TelegramAppContext;
