//! Tool registry builder — assembles the canonical tool set for a channel
//! adapter, wrapped in access-level and scrub-level policy.

use std::sync::Arc;

use warden_core::types::AccessLevel;

use crate::pipeline::context::MessageContext;

use super::execute_command::ExecuteCommandTool;
use super::link_identity::LinkIdentityTool;
use super::registry::{RegisteredTool, ToolRegistry};
use super::reminder::ReminderTool;
use super::scrub::ScrubLevel;
use super::send_message::SendMessageTool;
use super::skill::{load_skills, SkillReadTool};
use super::subagent_tool::SpawnSubagentTool;

/// Build the full tool registry available to the AI for a given request.
///
/// Includes:
/// - `read_file`, `write_file`, `list_files`, `search_files`, `patch_file` (filesystem)
/// - `execute_command` (one-shot shell command)
/// - `reminder` (schedule proactive reminders via the scheduler)
/// - `send_message` (deliver a message to another connected channel)
/// - `link_identity` (self-service cross-channel account linking)
/// - `skill_read` (retrieve a loaded skill's full instructions, if any are installed)
/// - `spawn_subagent` (owner-only; delegate a task to a background worker turn)
///
/// `session_key` is forwarded to `ReminderTool` so reminders it creates are
/// bound to the calling session. `current_user_id` is forwarded to both
/// `ReminderTool` (as `created_by`) and `LinkIdentityTool`. `channel_id` is
/// unused here — delivery routing happens at fire time, from `session_key`.
pub fn build_tools<C: MessageContext + 'static>(
    ctx: Arc<C>,
    channel_name: &str,
    channel_id: Option<u64>,
    session_key: Option<&str>,
    current_user_id: Option<String>,
) -> ToolRegistry {
    let _ = (channel_name, channel_id);
    let mut tools: Vec<RegisteredTool> = vec![
        RegisteredTool::new(Box::new(super::read_file::ReadFileTool))
            .at_level(AccessLevel::Family),
        RegisteredTool::new(Box::new(super::write_file::WriteFileTool))
            .at_level(AccessLevel::Family),
        RegisteredTool::new(Box::new(super::list_files::ListFilesTool))
            .at_level(AccessLevel::Family),
        RegisteredTool::new(Box::new(super::search_files::SearchFilesTool))
            .at_level(AccessLevel::Family),
        RegisteredTool::new(Box::new(super::patch_file::PatchFileTool))
            .at_level(AccessLevel::Family),
        RegisteredTool::new(Box::new(ExecuteCommandTool::new(Arc::clone(&ctx))))
            .at_level(AccessLevel::Admin)
            .with_scrub(ScrubLevel::Safe),
        RegisteredTool::new(Box::new(ReminderTool::new(
            Arc::clone(&ctx),
            session_key.unwrap_or_default(),
            current_user_id.clone(),
        )))
        .at_level(AccessLevel::Friend),
        RegisteredTool::new(Box::new(SendMessageTool::new(Arc::clone(&ctx))))
            .at_level(AccessLevel::Friend),
        RegisteredTool::new(Box::new(LinkIdentityTool::new(
            Arc::clone(&ctx),
            current_user_id,
        )))
        .at_level(AccessLevel::Public),
        RegisteredTool::new(Box::new(SpawnSubagentTool::new(
            Arc::clone(&ctx),
            session_key.unwrap_or_default(),
        )))
        .at_level(AccessLevel::Owner),
    ];

    let skills = load_skills();
    if !skills.is_empty() {
        tools.push(
            RegisteredTool::new(Box::new(SkillReadTool::new(skills))).at_level(AccessLevel::Public),
        );
    }

    // Load script plugins from ~/.warden/tools/ — no restart needed after adding
    // a plugin, tools are re-scanned on each build_tools() call (i.e. each new
    // message). Plugins default to family-level with an aggressive scrub, same
    // as the bundled filesystem tools, since they run arbitrary scripts.
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let tools_dir = std::path::Path::new(&home).join(".warden/tools");
    for plugin in super::script_tool::load_script_tools(&tools_dir) {
        tools.push(RegisteredTool::new(plugin).at_level(AccessLevel::Family));
    }

    ToolRegistry::new(tools)
}
