//! LLM provider abstraction, agent runtime, and tool system.
//!
//! `provider` defines the channel-agnostic `LlmProvider` trait; `anthropic`,
//! `openai`, `ollama`, `oauth`, and `hybrid` implement it. `router` composes
//! providers with failover. `runtime` wraps a provider + prompt builder into
//! the long-lived `AgentRuntime` shared by every channel adapter. `pipeline`
//! holds the channel-agnostic message-handling pipeline; `tools` holds the
//! tool registry and every built-in tool.

pub mod abilities;
pub mod anthropic;
pub mod anthropic_stream;
pub mod health;
pub mod hybrid;
pub mod oauth;
pub mod ollama;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod router;
pub mod runtime;
pub mod sanitize;
pub mod stream;
pub mod subagent;
pub mod thinking;
pub mod tools;

pub use provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
pub use runtime::AgentRuntime;
