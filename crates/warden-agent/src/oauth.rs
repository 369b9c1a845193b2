//! Generic OAuth-refreshing provider for any OpenAI-compatible endpoint that
//! authenticates via a refresh-token grant (device-flow providers like Qwen,
//! or anything else reachable through an OpenAI-shaped chat API).
//!
//! Credentials are cached in memory and persisted back to disk whenever
//! refreshed. A read-lock fast path serves most requests without touching
//! the network; a write-lock slow path refreshes the token once it's within
//! [`REFRESH_BUFFER_MS`] of expiry, re-checking under the write lock in case
//! another task refreshed it first. `last_checked` bounds how often the fast
//! path re-validates expiry against the system clock, so a burst of
//! concurrent requests doesn't hammer `Instant::now()` / lock acquisition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::openai;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, TokenInfo, TokenType};
use crate::stream::StreamEvent;

/// Proactively refresh once the token is within 5 minutes of expiry.
const REFRESH_BUFFER_MS: i64 = 5 * 60 * 1000;
/// Don't re-derive the "is this still fresh" answer more than once per 30s.
const READ_CACHE: std::time::Duration = std::time::Duration::from_secs(30);

/// Static description of the OAuth token endpoint and the downstream API.
#[derive(Debug, Clone)]
pub struct OAuthEndpoint {
    pub provider_name: String,
    pub token_url: String,
    pub client_id: String,
    pub api_base: String,
    pub chat_path: String,
}

/// OAuth credentials persisted to disk as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Unix epoch milliseconds.
    pub expiry_date: i64,
    #[serde(default)]
    pub resource_url: Option<String>,
}

struct CachedToken {
    creds: OAuthCredentials,
    last_checked: Instant,
}

pub struct OAuthProvider {
    client: reqwest::Client,
    endpoint: OAuthEndpoint,
    cache: Arc<RwLock<CachedToken>>,
    credentials_path: String,
}

impl OAuthProvider {
    pub fn new(endpoint: OAuthEndpoint, credentials: OAuthCredentials, credentials_path: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            cache: Arc::new(RwLock::new(CachedToken {
                creds: credentials,
                last_checked: Instant::now(),
            })),
            credentials_path,
        }
    }

    pub fn from_file(endpoint: OAuthEndpoint, path: &str) -> Result<Self, ProviderError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Unavailable(format!("cannot read OAuth credentials: {e}")))?;
        let creds: OAuthCredentials = serde_json::from_str(&data)
            .map_err(|e| ProviderError::Parse(format!("invalid OAuth credentials JSON: {e}")))?;
        Ok(Self::new(endpoint, creds, path.to_string()))
    }

    async fn ensure_token(&self) -> Result<String, ProviderError> {
        let now = chrono::Utc::now().timestamp_millis();

        {
            let cached = self.cache.read().await;
            let within_read_cache = cached.last_checked.elapsed() < READ_CACHE;
            let not_expiring_soon = now + REFRESH_BUFFER_MS < cached.creds.expiry_date;
            if within_read_cache || not_expiring_soon {
                return Ok(cached.creds.access_token.clone());
            }
        }

        let mut cached = self.cache.write().await;
        let now = chrono::Utc::now().timestamp_millis();
        if now + REFRESH_BUFFER_MS < cached.creds.expiry_date {
            cached.last_checked = Instant::now();
            return Ok(cached.creds.access_token.clone());
        }

        info!(provider = %self.endpoint.provider_name, "refreshing OAuth access token");
        let refreshed = self.refresh_token(&cached.creds).await?;
        cached.creds = refreshed;
        cached.last_checked = Instant::now();

        if let Ok(json) = serde_json::to_string_pretty(&cached.creds) {
            if let Err(e) = std::fs::write(&self.credentials_path, json) {
                warn!(
                    path = %self.credentials_path,
                    error = %e,
                    "failed to persist refreshed OAuth credentials"
                );
            }
        }

        Ok(cached.creds.access_token.clone())
    }

    async fn refresh_token(&self, current: &OAuthCredentials) -> Result<OAuthCredentials, ProviderError> {
        let body = format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}",
            urlencoding::encode(&current.refresh_token),
            self.endpoint.client_id
        );

        let resp = self
            .client
            .post(&self.endpoint.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: 401,
                message: format!("{} token refresh failed: {text}", self.endpoint.provider_name),
            });
        }

        let token_resp: TokenRefreshResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let now = chrono::Utc::now().timestamp_millis();
        debug!(
            provider = %self.endpoint.provider_name,
            expires_in = token_resp.expires_in,
            "OAuth token refreshed"
        );

        Ok(OAuthCredentials {
            access_token: token_resp.access_token,
            refresh_token: token_resp.refresh_token.unwrap_or_else(|| current.refresh_token.clone()),
            token_type: token_resp.token_type.unwrap_or_else(|| current.token_type.clone()),
            expiry_date: now + (token_resp.expires_in as i64 * 1000),
            resource_url: current.resource_url.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for OAuthProvider {
    fn name(&self) -> &str {
        &self.endpoint.provider_name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let token = self.ensure_token().await?;
        let url = format!("{}{}", self.endpoint.api_base, self.endpoint.chat_path);
        let body = openai::build_request_body(req, false);

        debug!(model = %req.model, provider = %self.endpoint.provider_name, "sending request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_ms: 5000 });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, provider = %self.endpoint.provider_name, "API error");
            return Err(ProviderError::Api { status, message: text });
        }

        let api_resp: openai::ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(openai::parse_response(api_resp))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let token = self.ensure_token().await?;
        let url = format!("{}{}", self.endpoint.api_base, self.endpoint.chat_path);
        let body = openai::build_request_body(req, true);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_ms: 5000 });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, provider = %self.endpoint.provider_name, "streaming API error");
            return Err(ProviderError::Api { status, message: text });
        }

        openai::process_openai_stream(resp, req.model.clone(), tx).await;
        Ok(())
    }

    fn token_info(&self) -> Option<TokenInfo> {
        let cached = self.cache.try_read().ok()?;
        Some(TokenInfo {
            token_type: TokenType::OAuth,
            expires_at: Some(cached.creds.expiry_date / 1000),
            refreshable: true,
        })
    }

    async fn refresh_auth(&self) -> Result<(), ProviderError> {
        self.ensure_token().await.map(|_| ())
    }
}

#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_endpoint() -> OAuthEndpoint {
        OAuthEndpoint {
            provider_name: "test-oauth".into(),
            token_url: "https://example.invalid/token".into(),
            client_id: "client".into(),
            api_base: "https://example.invalid".into(),
            chat_path: "/v1/chat/completions".into(),
        }
    }

    #[tokio::test]
    async fn fast_path_serves_unexpired_token_without_refresh() {
        let now = chrono::Utc::now().timestamp_millis();
        let creds = OAuthCredentials {
            access_token: "valid-token".into(),
            refresh_token: "r".into(),
            token_type: "Bearer".into(),
            expiry_date: now + 60 * 60 * 1000,
            resource_url: None,
        };
        let provider = OAuthProvider::new(test_endpoint(), creds, "/tmp/nonexistent-creds.json".into());
        let token = provider.ensure_token().await.unwrap();
        assert_eq!(token, "valid-token");
    }

    #[test]
    fn token_info_reports_oauth_type() {
        let now = chrono::Utc::now().timestamp_millis();
        let creds = OAuthCredentials {
            access_token: "t".into(),
            refresh_token: "r".into(),
            token_type: "Bearer".into(),
            expiry_date: now + 1000,
            resource_url: None,
        };
        let provider = OAuthProvider::new(test_endpoint(), creds, "/tmp/nonexistent-creds.json".into());
        let info = provider.token_info().unwrap();
        assert_eq!(info.token_type, TokenType::OAuth);
        assert!(info.refreshable);
    }
}
