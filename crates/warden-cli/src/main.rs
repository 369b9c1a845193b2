//! `warden` — local REPL channel.
//!
//! Talks to the same agent runtime, memory, and session stores the daemon
//! uses, against the same SQLite database, so history and memory carry over
//! between a Telegram conversation and a terminal one for the same owner.

mod commands;
mod context;

use std::sync::Arc;

use clap::Parser;
use dashmap::DashMap;
use rusqlite::Connection;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use warden_agent::abilities::{self, AbilityRegistry};
use warden_agent::pipeline::context::MessageContext;
use warden_agent::pipeline::process_message_non_streaming;
use warden_agent::prompt::PromptBuilder;
use warden_agent::runtime::AgentRuntime;
use warden_agent::subagent::SubagentManager;
use warden_core::config::WardenConfig;
use warden_memory::manager::MemoryManager;
use warden_scheduler::SchedulerHandle;
use warden_sessions::SessionManager;
use warden_users::ratelimit::{RateLimiter, RateLimiterConfig};
use warden_users::resolver::UserResolver;

use context::CliContext;

#[derive(Parser, Debug)]
#[command(name = "warden", about = "Warden local REPL")]
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
        .with_writer(std::io::stderr)
        .init();

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

    let llm_provider = warden_daemon::provider::build_provider(&config.provider, &config.credential)?;
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

    // A local terminal session always resolves to the same identifier, so
    // it's one continuous conversation across runs of the binary.
    let resolved = users.resolve("cli", "local")?;
    let user_id = resolved.user().id.clone();
    let session_key = format!("user:{user_id}:cli:local");

    let ctx = Arc::new(CliContext {
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

    println!("Warden CLI — type `/help` for commands, Ctrl-D to exit.");

    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline("warden> ") {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        };

        let text = line.trim().to_string();
        if text.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(text.as_str());

        if text.starts_with('/') {
            if let Some(response) =
                warden_agent::pipeline::slash::handle_slash_command(&text, ctx.as_ref()).await
            {
                println!("{response}\n");
                continue;
            }
            if let Some(response) =
                commands::handle_local_command(&text, &ctx, &session_key, &user_id).await
            {
                println!("{response}\n");
                continue;
            }
        }

        let access_level = ctx
            .users()
            .get_user(&user_id)
            .ok()
            .flatten()
            .map(|u| u.access_level)
            .unwrap_or(warden_core::types::AccessLevel::Owner);
        let (allowed, limit_msg) = ctx
            .ratelimiter()
            .check(&warden_core::types::UserId::from(user_id.clone()), access_level);
        if !allowed {
            println!("{limit_msg}\n");
            continue;
        }

        let result = process_message_non_streaming(
            &ctx,
            &session_key,
            "cli",
            &text,
            None,
            None,
            None,
            None,
            None,
            Some(&user_id),
        )
        .await;

        match result {
            Ok(pm) => println!("{}\n", pm.content),
            Err(e) => eprintln!("error: {e}\n"),
        }
    }

    Ok(())
}
