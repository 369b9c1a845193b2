//! Shared context interface for all channel adapters.
//!
//! `MessageContext` is the single trait that every channel host (Telegram,
//! CLI, future channels) must implement. It lets the pipeline and tool layer
//! stay channel-agnostic.

use std::sync::Arc;

use warden_core::config::WardenConfig;
use warden_memory::manager::MemoryManager;
use warden_scheduler::SchedulerHandle;
use warden_sessions::SessionManager;
use warden_users::ratelimit::RateLimiter;
use warden_users::resolver::UserResolver;

use crate::abilities::AbilityRegistry;
use crate::runtime::AgentRuntime;
use crate::subagent::SubagentManager;

/// Minimal context interface required by the shared message pipeline and
/// the native tool set.
///
/// Implemented by the per-channel app state in `warden-telegram`/`warden-cli`.
/// Defined here (in `warden-agent`) to avoid a circular dependency: channel
/// crates depend on `warden-agent`, not the other way around.
pub trait MessageContext: Send + Sync {
    fn agent(&self) -> &AgentRuntime;
    fn memory(&self) -> &MemoryManager;
    fn sessions(&self) -> &SessionManager;
    fn scheduler(&self) -> &SchedulerHandle;
    fn users(&self) -> &UserResolver;
    fn ratelimiter(&self) -> &RateLimiter;
    fn config(&self) -> &WardenConfig;
    fn abilities(&self) -> &AbilityRegistry;
    /// Returns an owned `Arc` (not `&SubagentManager`) because spawning a
    /// worker needs to hand the manager its own strong reference to move
    /// into the detached task.
    fn subagents(&self) -> Arc<SubagentManager>;

    /// Names of channels currently connected to this runtime (e.g. `"telegram"`, `"cli"`).
    fn connected_channels(&self) -> Vec<String>;

    /// Deliver `message` to `recipient` on `channel`. `recipient` is
    /// channel-specific: a chat ID string for Telegram, a session key for CLI.
    fn send_to_channel(&self, channel: &str, recipient: &str, message: &str) -> Result<(), String>;
}
