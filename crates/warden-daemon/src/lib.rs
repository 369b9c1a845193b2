//! Shared daemon building blocks — `AppState` and the provider factory are
//! also reused by `warden-cli` so both channels bootstrap identically.

pub mod app;
pub mod provider;
pub mod reminders;
