use std::time::Duration;

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::errors::{EyeHandError, EyeHandResult};
use crate::llm::types::ChatMessage;

/// Seam to the chat-completion backend. The engine only ever needs the
/// assistant's reply text; streaming is not used.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>, timeout: Duration) -> EyeHandResult<String>;
}

/// OpenAI-compatible chat-completion client (works against the self-hosted
/// ShowUI service or any hosted endpoint with the same wire format).
pub struct OpenAiGateway {
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

impl OpenAiGateway {
    pub fn new(api_base: String, api_key: String, model: String, temperature: f64) -> Self {
        Self {
            api_base,
            api_key,
            model,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &GatewayConfig) -> Self {
        Self::new(
            cfg.api_base.clone(),
            cfg.resolve_api_key(),
            cfg.model.clone(),
            cfg.temperature,
        )
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn chat(&self, messages: Vec<ChatMessage>, timeout: Duration) -> EyeHandResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": &messages,
            "temperature": self.temperature,
        });

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            body = %sanitized_body(&body),
            "sending gateway request"
        );

        let response = tokio::time::timeout(
            timeout,
            self.client
                .post(&self.api_base)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| EyeHandError::Gateway(format!("request timed out after {timeout:?}")))?
        .map_err(|e| EyeHandError::Gateway(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EyeHandError::GatewayStatus { status, body });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EyeHandError::Gateway(e.to_string()))?;

        let content = extract_content(&json)?;

        tracing::info!(content_len = content.len(), "gateway reply received");
        Ok(content)
    }
}

/// Pull the assistant text out of a chat-completion response. A 2xx body
/// without `choices[0].message.content` is a malformed reply, not an empty
/// one, and is surfaced as a gateway error.
fn extract_content(json: &serde_json::Value) -> EyeHandResult<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            EyeHandError::Gateway("response missing choices[0].message.content".into())
        })
}

/// Serialize the request body for logging with base64 image payloads
/// replaced, so debug logs stay readable.
fn sanitized_body(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            if let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) {
                for part in parts {
                    if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                        if let Some(url) = part
                            .get_mut("image_url")
                            .and_then(|iu| iu.get_mut("url"))
                        {
                            *url = serde_json::Value::String("<omitted_base64_image>".into());
                        }
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
