//! `CliContext` — the `MessageContext` implementation for the local REPL.
//!
//! Single-user, single-process: one owner talking to one agent runtime, no
//! channel fan-out. `connected_channels`/`send_to_channel` are trivial stubs
//! since the REPL has nowhere else to route a message.

use dashmap::DashMap;
use tokio::sync::mpsc;

use std::sync::Arc;

use warden_agent::abilities::AbilityRegistry;
use warden_agent::pipeline::context::MessageContext;
use warden_agent::runtime::AgentRuntime;
use warden_agent::subagent::SubagentManager;
use warden_core::config::WardenConfig;
use warden_core::types::ChannelOutbound;
use warden_memory::manager::MemoryManager;
use warden_scheduler::SchedulerHandle;
use warden_sessions::SessionManager;
use warden_users::ratelimit::RateLimiter;
use warden_users::resolver::UserResolver;

pub struct CliContext {
    pub config: WardenConfig,
    pub agent: AgentRuntime,
    pub users: UserResolver,
    pub memory: MemoryManager,
    pub sessions: SessionManager,
    pub scheduler: SchedulerHandle,
    pub ratelimiter: RateLimiter,
    pub abilities: AbilityRegistry,
    pub subagents: Arc<SubagentManager>,
    pub channel_senders: DashMap<String, mpsc::Sender<ChannelOutbound>>,
}

impl MessageContext for CliContext {
    fn agent(&self) -> &AgentRuntime {
        &self.agent
    }

    fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    fn users(&self) -> &UserResolver {
        &self.users
    }

    fn ratelimiter(&self) -> &RateLimiter {
        &self.ratelimiter
    }

    fn config(&self) -> &WardenConfig {
        &self.config
    }

    fn abilities(&self) -> &AbilityRegistry {
        &self.abilities
    }

    fn subagents(&self) -> Arc<SubagentManager> {
        Arc::clone(&self.subagents)
    }

    fn connected_channels(&self) -> Vec<String> {
        self.channel_senders.iter().map(|e| e.key().clone()).collect()
    }

    fn send_to_channel(&self, channel: &str, recipient: &str, message: &str) -> Result<(), String> {
        let tx = self
            .channel_senders
            .get(channel)
            .ok_or_else(|| format!("channel '{channel}' is not connected"))?;
        tx.try_send(ChannelOutbound {
            recipient: recipient.to_string(),
            message: message.to_string(),
        })
        .map_err(|e| format!("failed to queue outbound message on '{channel}': {e}"))
    }
}
