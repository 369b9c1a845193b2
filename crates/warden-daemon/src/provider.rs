//! Builds the active `LlmProvider` from `[provider]` config.
//!
//! Scope for this pass: explicit API-key providers (Anthropic, OpenAI,
//! Ollama) composed through `HybridProvider` for chat+embedding. The
//! generic `OAuthProvider` in `warden_agent::oauth` exists for
//! device-flow-authenticated OpenAI-compatible backends (Qwen and similar)
//! but has no `[provider]` config surface yet — wiring it up is a future
//! `warden-cli` login-flow addition, not part of daemon startup.

use warden_core::config::{CredentialConfig, ProviderConfig};

use warden_agent::hybrid::HybridProvider;
use warden_agent::provider::LlmProvider;
use warden_agent::{anthropic::AnthropicProvider, ollama::OllamaProvider, openai::OpenAiProvider};

/// Resolve the Anthropic API key: an explicit `credential.anthropic_api_key`
/// takes priority over the `ANTHROPIC_API_KEY` environment variable.
fn anthropic_api_key(credential: &CredentialConfig) -> Option<String> {
    credential
        .values
        .get("anthropic_api_key")
        .cloned()
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
}

fn build_chat_provider(
    config: &ProviderConfig,
    credential: &CredentialConfig,
) -> anyhow::Result<Box<dyn LlmProvider>> {
    if let Some(anthropic) = &config.anthropic {
        let key = anthropic_api_key(credential).ok_or_else(|| {
            anyhow::anyhow!(
                "no Anthropic API key: set credential.anthropic_api_key or ANTHROPIC_API_KEY"
            )
        })?;
        return Ok(Box::new(AnthropicProvider::new(
            key,
            Some(anthropic.base_url.clone()),
        )));
    }

    if let Some(openai) = &config.openai {
        return Ok(Box::new(OpenAiProvider::new(
            openai.api_key.clone(),
            Some(openai.base_url.clone()),
        )));
    }

    if let Some(ollama) = &config.ollama {
        return Ok(Box::new(OllamaProvider::new(Some(ollama.base_url.clone()))));
    }

    // Nothing configured at all — fall back to Anthropic, reading the key
    // straight from the environment. Matches `default_active_model()`
    // ("claude-sonnet-4-6"), so an unconfigured install still does something
    // sensible with just `ANTHROPIC_API_KEY` set.
    let key = anthropic_api_key(credential).ok_or_else(|| {
        anyhow::anyhow!(
            "no provider configured in warden.toml and no ANTHROPIC_API_KEY set"
        )
    })?;
    Ok(Box::new(AnthropicProvider::new(key, None)))
}

/// Pick an embedding-capable backend. Anthropic has no embeddings endpoint,
/// so Ollama (if configured) wins for locality, then OpenAI, then whatever
/// the chat provider already is (it will error on first `embed()` call if
/// that backend doesn't support it — logged once, not fatal at startup).
fn build_embed_provider(config: &ProviderConfig) -> Option<Box<dyn LlmProvider>> {
    if let Some(ollama) = &config.ollama {
        return Some(Box::new(OllamaProvider::new(Some(ollama.base_url.clone()))));
    }
    if let Some(openai) = &config.openai {
        return Some(Box::new(OpenAiProvider::new(
            openai.api_key.clone(),
            Some(openai.base_url.clone()),
        )));
    }
    None
}

/// Build the `LlmProvider` the runtime will hold for the lifetime of the process.
pub fn build_provider(
    config: &ProviderConfig,
    credential: &CredentialConfig,
) -> anyhow::Result<Box<dyn LlmProvider>> {
    let chat = build_chat_provider(config, credential)?;
    match build_embed_provider(config) {
        Some(embed) => Ok(Box::new(HybridProvider::new(chat, embed))),
        None => {
            tracing::warn!(
                "no dedicated embedding backend configured; embedding calls will \
                 be routed through the chat provider and may fail"
            );
            Ok(chat)
        }
    }
}
