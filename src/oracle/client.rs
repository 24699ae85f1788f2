// =============================================================================
// Chat-Completion Client — OpenAI-compatible forecast oracle over HTTPS
// =============================================================================
//
// SECURITY: The API key is sent only as a bearer header and is never logged
// or serialised. `Debug` output redacts it.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{ForecastOracle, OracleCallError};
use crate::runtime_config::OracleConfig;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionClient {
    base_url: String,
    model: String,
    max_tokens: u32,
    top_p: f64,
    client: reqwest::Client,
}

impl ChatCompletionClient {
    /// Build a client from the oracle config and an API key.
    ///
    /// The transport timeout matches the per-call bound so that an abandoned
    /// call does not hold its connection open indefinitely.
    pub fn new(config: &OracleConfig, api_key: &str) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .context("oracle API key is not a valid header value")?;
            default_headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %config.base_url, model = %config.model, "ChatCompletionClient initialised");

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            client,
        })
    }

    /// Pull `choices[0].message.content` out of a completion envelope.
    fn extract_content(body: &serde_json::Value) -> Result<String, OracleCallError> {
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleCallError::Envelope("missing choices[0].message.content".into()))
    }
}

#[async_trait]
impl ForecastOracle for ChatCompletionClient {
    /// POST {base_url}/chat/completions.
    #[instrument(skip(self, prompt), name = "oracle::complete")]
    async fn complete(&self, prompt: &str, temperature: f64) -> Result<String, OracleCallError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleCallError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OracleCallError::Envelope(e.to_string()))?;

        let content = Self::extract_content(&body)?;
        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_content() {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"a\":1}" } }]
        });
        assert_eq!(
            ChatCompletionClient::extract_content(&body).unwrap(),
            "{\"a\":1}"
        );
    }

    #[test]
    fn missing_content_is_envelope_error() {
        let body = serde_json::json!({ "choices": [] });
        assert!(matches!(
            ChatCompletionClient::extract_content(&body),
            Err(OracleCallError::Envelope(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let client = ChatCompletionClient::new(&OracleConfig::default(), "sk-secret").unwrap();
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
