//! Tool re-export for the Telegram adapter.
//!
//! All tools are shared — implemented once in `warden-agent` and re-exported here
//! following the same thin-wrapper pattern as `warden-discord/src/tools.rs`.

pub use warden_agent::tools::build::build_tools;
