use serde::{Deserialize, Serialize};

/// What kind of fact this is. Mirrors the evaluator's category vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Event,
    Lesson,
    Decision,
    Health,
    Relationship,
    Config,
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Preference => write!(f, "preference"),
            Self::Event => write!(f, "event"),
            Self::Lesson => write!(f, "lesson"),
            Self::Decision => write!(f, "decision"),
            Self::Health => write!(f, "health"),
            Self::Relationship => write!(f, "relationship"),
            Self::Config => write!(f, "config"),
        }
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "event" => Ok(Self::Event),
            "lesson" => Ok(Self::Lesson),
            "decision" => Ok(Self::Decision),
            "health" => Ok(Self::Health),
            "relationship" => Ok(Self::Relationship),
            "config" => Ok(Self::Config),
            other => Err(format!("unknown memory category: {other}")),
        }
    }
}

/// How the memory was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// User stated this directly and the evaluator confirmed it.
    UserConfirmed,
    /// AI inferred from conversation context.
    Inferred,
    /// Admin set this on behalf of the user.
    AdminSet,
}

impl std::fmt::Display for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserConfirmed => write!(f, "user_confirmed"),
            Self::Inferred => write!(f, "inferred"),
            Self::AdminSet => write!(f, "admin_set"),
        }
    }
}

impl std::str::FromStr for MemorySource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_confirmed" => Ok(Self::UserConfirmed),
            "inferred" => Ok(Self::Inferred),
            "admin_set" => Ok(Self::AdminSet),
            other => Err(format!("unknown memory source: {other}")),
        }
    }
}

/// Single long-term memory fact for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemory {
    pub id: i64,
    pub user_id: String,
    pub category: MemoryCategory,
    pub content: String,
    /// 0.1–1.0. The evaluator clamps to this range.
    pub importance: f64,
    /// Permanent memories are never evicted by retention cleanup.
    pub permanent: bool,
    pub source: MemorySource,
    pub created_at: String,
    pub updated_at: String,
}

/// A single persisted conversation turn, with cost tracking for the
/// assistant side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub user_id: Option<String>,
    pub session_key: String,
    pub channel: String,
    pub role: String,
    pub content: String,
    /// Discriminates plain turns from tool results and compaction summaries.
    pub kind: MessageKind,
    /// JSON blob for kind-specific fields (tool_call_id, tool_name, ...).
    pub metadata: Option<String>,
    pub model_used: Option<String>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub created_at: String,
}

/// Tag for `ConversationMessage::kind`. Replaces ad-hoc JSON-shaped
/// metadata with an explicit sum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Message,
    ToolCall,
    ToolResult,
    CompactionSummary,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::CompactionSummary => write!(f, "compaction_summary"),
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "compaction_summary" => Ok(Self::CompactionSummary),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// Rendered user context ready for prompt injection.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub rendered: String,
    pub memory_count: usize,
    pub built_at: chrono::DateTime<chrono::Utc>,
}
