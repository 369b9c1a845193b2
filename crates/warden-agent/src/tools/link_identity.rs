//! Self-service identity linking tool — lets users link accounts across channels.
//!
//! Verification flow:
//! 1. User on Telegram: "link my CLI account"
//! 2. AI calls `link_identity(action: "generate", source_channel: "telegram")`
//! 3. Tool generates a 6-digit code and holds it in the process-wide `pending` table
//! 4. AI tells user: "Type `LINK 482916` in your other session"
//! 5. User on CLI: "LINK 482916"
//! 6. AI calls `link_identity(action: "verify", code: "482916")`
//! 7. Tool matches the code and re-assigns the source identity to the current user

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

/// How long a generated verification code stays valid.
const CODE_TTL: Duration = Duration::from_secs(5 * 60);

struct PendingLink {
    source_channel: String,
    source_identifier: String,
    issued_at: Instant,
}

/// Process-wide table of outstanding verification codes, shared by every
/// `LinkIdentityTool` instance (one per request) so a code generated from
/// one channel's session can be verified from another.
static PENDING: std::sync::OnceLock<DashMap<String, PendingLink>> = std::sync::OnceLock::new();

fn pending() -> &'static DashMap<String, PendingLink> {
    PENDING.get_or_init(DashMap::new)
}

/// Tool for self-service identity linking across channels.
pub struct LinkIdentityTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    /// The Warden user ID of the current session's user.
    current_user_id: Option<String>,
}

impl<C: MessageContext + 'static> LinkIdentityTool<C> {
    pub fn new(ctx: Arc<C>, current_user_id: Option<String>) -> Self {
        Self {
            ctx,
            current_user_id,
        }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for LinkIdentityTool<C> {
    fn name(&self) -> &str {
        "link_identity"
    }

    fn description(&self) -> &str {
        "Link user accounts across channels. Actions: \
         'generate' creates a 6-digit verification code, \
         'verify' validates a code and merges identities, \
         'list' shows the user's linked identities, \
         'unlink' removes an identity."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["generate", "verify", "list", "unlink"],
                    "description": "The action to perform."
                },
                "source_channel": {
                    "type": "string",
                    "description": "For 'generate': the channel where the code was initiated (e.g. 'discord')."
                },
                "source_identifier": {
                    "type": "string",
                    "description": "For 'generate': the identifier in the source channel."
                },
                "code": {
                    "type": "string",
                    "description": "For 'verify': the 6-digit verification code."
                },
                "channel": {
                    "type": "string",
                    "description": "For 'unlink': the channel of the identity to remove."
                },
                "identifier": {
                    "type": "string",
                    "description": "For 'unlink': the identifier of the identity to remove."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing 'action' parameter"),
        };

        let user_id = match &self.current_user_id {
            Some(id) => id.clone(),
            None => return ToolResult::error("no user context — cannot link identities"),
        };

        match action {
            "generate" => self.handle_generate(&input, &user_id),
            "verify" => self.handle_verify(&input, &user_id),
            "list" => self.handle_list(&user_id),
            "unlink" => self.handle_unlink(&input, &user_id),
            _ => ToolResult::error(format!(
                "unknown action '{}'. Use: generate, verify, list, unlink",
                action
            )),
        }
    }
}

impl<C: MessageContext + 'static> LinkIdentityTool<C> {
    /// Generate a 6-digit verification code for the other channel to redeem.
    fn handle_generate(&self, input: &serde_json::Value, _user_id: &str) -> ToolResult {
        let source_channel = match input.get("source_channel").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing 'source_channel' for generate action"),
        };
        let source_identifier = match input.get("source_identifier").and_then(|v| v.as_str()) {
            Some(i) if !i.is_empty() => i,
            _ => return ToolResult::error("missing 'source_identifier' for generate action"),
        };

        // Generate a random 6-digit code.
        let code: u32 = {
            use std::time::SystemTime;
            let seed = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos();
            100_000 + (seed % 900_000)
        };
        let code_str = code.to_string();

        pending().retain(|_, link| link.issued_at.elapsed() < CODE_TTL);
        pending().insert(
            code_str.clone(),
            PendingLink {
                source_channel: source_channel.to_string(),
                source_identifier: source_identifier.to_string(),
                issued_at: std::time::Instant::now(),
            },
        );

        ToolResult::success(format!(
            "Verification code generated: {}. \
             Tell the user to type 'LINK {}' in their other channel session. \
             Code expires in 5 minutes.",
            code_str, code_str
        ))
    }

    /// Verify a code and merge the source identity into the current user.
    fn handle_verify(&self, input: &serde_json::Value, user_id: &str) -> ToolResult {
        let code = match input.get("code").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c.trim(),
            _ => return ToolResult::error("missing 'code' parameter for verify action"),
        };

        let Some((_, link)) = pending().remove(code) else {
            return ToolResult::error("invalid or expired verification code");
        };
        if link.issued_at.elapsed() >= CODE_TTL {
            return ToolResult::error("verification code has expired");
        }

        // Perform the self-link: move the source identity to the current user.
        match self.ctx.users().self_link(
            &link.source_channel,
            &link.source_identifier,
            user_id,
        ) {
            Ok(()) => {
                let source_channel = link.source_channel;
                let source_identifier = link.source_identifier;
                ToolResult::success(format!(
                    "Identity linked! {}:{} is now connected to your account. \
                     Your memories and sessions are now unified across both channels.",
                    source_channel, source_identifier
                ))
            }
            Err(e) => {
                warn!(error = %e, "self_link failed");
                ToolResult::error(format!("failed to link identity: {}", e))
            }
        }
    }

    /// List all identities linked to the current user.
    fn handle_list(&self, user_id: &str) -> ToolResult {
        match self.ctx.users().list_identities(user_id) {
            Ok(identities) => {
                if identities.is_empty() {
                    return ToolResult::success("No linked identities found.");
                }
                let mut result = format!("Linked identities ({}):\n", identities.len());
                for ident in &identities {
                    result.push_str(&format!(
                        "- {}:{} (linked: {})\n",
                        ident.channel, ident.identifier, ident.linked_at
                    ));
                }
                ToolResult::success(result)
            }
            Err(e) => ToolResult::error(format!("failed to list identities: {}", e)),
        }
    }

    /// Remove an identity from the current user (self-service or admin).
    fn handle_unlink(&self, input: &serde_json::Value, user_id: &str) -> ToolResult {
        let channel = match input.get("channel").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing 'channel' parameter for unlink action"),
        };
        let identifier = match input.get("identifier").and_then(|v| v.as_str()) {
            Some(i) if !i.is_empty() => i,
            _ => return ToolResult::error("missing 'identifier' parameter for unlink action"),
        };

        // Verify the identity belongs to the current user before removing.
        let identities = self
            .ctx
            .users()
            .list_identities(user_id)
            .unwrap_or_default();
        let owns = identities
            .iter()
            .any(|i| i.channel == channel && i.identifier == identifier);

        if !owns {
            return ToolResult::error(format!(
                "identity {}:{} is not linked to your account",
                channel, identifier
            ));
        }

        // Don't allow removing the last identity.
        if identities.len() <= 1 {
            return ToolResult::error(
                "cannot remove your last identity — you would lose access to your account",
            );
        }

        match self.ctx.users().remove_identity(user_id, channel, identifier) {
            Ok(()) => ToolResult::success(format!("Identity {}:{} unlinked.", channel, identifier)),
            Err(e) => {
                warn!(error = %e, "remove_identity failed");
                ToolResult::error(format!("failed to unlink identity: {}", e))
            }
        }
    }
}
