//! Composes a chat-capable provider with a separate embedding-capable one.
//!
//! Some providers (Anthropic) have no embeddings endpoint at all, and the
//! cheapest embedding models rarely come from the same vendor as the best
//! chat models. `HybridProvider` lets the two be configured independently
//! while presenting a single `LlmProvider` to the rest of the agent.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::provider::{ChatRequest, ChatResponse, EmbeddingResponse, LlmProvider, ProviderError, TokenInfo};
use crate::stream::StreamEvent;

pub struct HybridProvider {
    chat: Box<dyn LlmProvider>,
    embed: Box<dyn LlmProvider>,
    name: String,
}

impl HybridProvider {
    pub fn new(chat: Box<dyn LlmProvider>, embed: Box<dyn LlmProvider>) -> Self {
        let name = format!("{}+{}", chat.name(), embed.name());
        Self { chat, embed, name }
    }
}

#[async_trait]
impl LlmProvider for HybridProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.chat.send(req).await
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        self.chat.send_stream(req, tx).await
    }

    fn token_info(&self) -> Option<TokenInfo> {
        self.chat.token_info()
    }

    async fn refresh_auth(&self) -> Result<(), ProviderError> {
        self.chat.refresh_auth().await
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, ProviderError> {
        self.embed.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingResponse, ProviderError> {
        self.embed.embed_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role};

    struct StubChat;
    #[async_trait]
    impl LlmProvider for StubChat {
        fn name(&self) -> &str {
            "stub-chat"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "hi".into(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".into(),
                tool_calls: vec![],
            })
        }
    }

    struct StubEmbed;
    #[async_trait]
    impl LlmProvider for StubEmbed {
        fn name(&self) -> &str {
            "stub-embed"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("chat not supported".into()))
        }
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                vectors: vec![vec![0.1, 0.2]],
                model: "stub-embed-model".into(),
                tokens_in: 2,
            })
        }
    }

    #[tokio::test]
    async fn delegates_chat_and_embed_to_respective_backends() {
        let hybrid = HybridProvider::new(Box::new(StubChat), Box::new(StubEmbed));
        assert_eq!(hybrid.name(), "stub-chat+stub-embed");

        let req = ChatRequest {
            model: "m".into(),
            system: String::new(),
            system_prompt: None,
            messages: vec![Message { role: Role::User, content: "hi".into() }],
            max_tokens: 10,
            stream: false,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };
        assert_eq!(hybrid.send(&req).await.unwrap().content, "hi");

        let emb = hybrid.embed("hello").await.unwrap();
        assert_eq!(emb.model, "stub-embed-model");
    }
}
