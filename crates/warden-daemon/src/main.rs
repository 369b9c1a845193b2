//! `wardend` — daemon entry point.
//!
//! Boots storage, the agent runtime, the scheduler, and whichever channel
//! adapters are enabled, then blocks until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use warden_agent::abilities::{self, AbilityRegistry};
use warden_agent::prompt::PromptBuilder;
use warden_agent::runtime::AgentRuntime;
use warden_agent::subagent::SubagentManager;
use warden_core::config::WardenConfig;
use warden_memory::manager::MemoryManager;
use warden_scheduler::{SchedulerEngine, SchedulerHandle};
use warden_sessions::SessionManager;
use warden_users::ratelimit::{RateLimiter, RateLimiterConfig};
use warden_users::resolver::UserResolver;

use warden_daemon::app::AppState;
use warden_daemon::{provider, reminders};

#[derive(Parser, Debug)]
#[command(name = "wardend", about = "Warden daemon — Telegram + scheduler runtime")]
struct Args {
    /// Path to warden.toml. Defaults to ~/.warden/warden.toml.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match WardenConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("warning: failed to load config ({e}); using defaults");
            WardenConfig::default()
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.daemon.log_level.clone())),
        )
        .init();

    tracing::info!(data_dir = %config.daemon.data_dir, db = %config.database.path, "starting warden daemon");

    let users_conn = Connection::open(&config.database.path)?;
    warden_users::db::init_db(&users_conn)?;
    let users = UserResolver::new(Arc::new(std::sync::Mutex::new(users_conn)));

    let memory_conn = Connection::open(&config.database.path)?;
    warden_memory::db::init_db(&memory_conn)?;
    let memory = MemoryManager::new(memory_conn);

    let sessions_conn = Connection::open(&config.database.path)?;
    warden_sessions::db::init_db(&sessions_conn)?;
    let sessions = SessionManager::new(sessions_conn);

    let scheduler_conn = Connection::open(&config.database.path)?;
    let scheduler = SchedulerHandle::new(scheduler_conn)?;

    let ratelimiter = RateLimiter::new(RateLimiterConfig {
        max_requests: config.ratelimit.max_requests,
        window_seconds: config.ratelimit.window_seconds,
        owner_exempt: config.ratelimit.owner_exempt,
    });

    let llm_provider = provider::build_provider(&config.provider, &config.credential)?;
    let prompt_builder = PromptBuilder::load(None, None);
    let agent = AgentRuntime::new(llm_provider, prompt_builder, config.provider.active_model.clone());

    let mut ability_registry = AbilityRegistry::new();
    let abilities_dir = std::path::Path::new(&config.daemon.data_dir).join("abilities");
    for ability in abilities::load_abilities(&abilities_dir) {
        ability_registry.register(ability, false);
    }

    let subagent_conn = Connection::open(&config.database.path)?;
    let subagents = Arc::new(SubagentManager::new(
        subagent_conn,
        config.subagents.enabled,
        config.subagents.max_concurrent,
        config.subagents.timeout_seconds,
        config.subagents.max_tool_rounds,
    )?);

    let state = Arc::new(AppState {
        config: config.clone(),
        agent,
        users,
        memory,
        sessions,
        scheduler,
        ratelimiter,
        abilities: ability_registry,
        subagents,
        channel_senders: DashMap::new(),
    });

    // Scheduler engine runs in its own connection, independent of the handle
    // tools use to create/list/delete tasks.
    let engine_conn = Connection::open(&config.database.path)?;
    let (fired_tx, fired_rx) = mpsc::channel(64);
    let engine = SchedulerEngine::new(engine_conn, Some(fired_tx))?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(engine.run(shutdown_rx));

    let telegram_enabled = config.daemon.telegram_enabled && config.telegram.bot_token.is_some();

    let telegram_delivery_tx = if telegram_enabled {
        let (tx, rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel::<warden_core::types::ChannelOutbound>(64);
        state.channel_senders.insert("telegram".to_string(), outbound_tx);

        let adapter = warden_telegram::adapter::TelegramAdapter::new(&config.telegram, Arc::clone(&state));
        tokio::spawn(async move {
            if let Err(e) = adapter.run(Some(rx), Some(outbound_rx)).await {
                tracing::error!(error = %e, "telegram adapter exited with error");
            }
        });
        Some(tx)
    } else {
        tracing::info!("telegram adapter disabled (no bot_token or daemon.telegram_enabled = false)");
        None
    };

    tokio::spawn(reminders::run_reminder_router(fired_rx, telegram_delivery_tx));

    tracing::info!("warden daemon ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    Ok(())
}
