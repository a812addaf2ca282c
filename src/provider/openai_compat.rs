// src/provider/openai_compat.rs — OpenAI-compatible streaming provider
//
// Talks to any `/chat/completions` endpoint that speaks the OpenAI SSE
// dialect (Hunyuan, DeepSeek, Groq, ...).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};

use super::{ChatChunk, ChatRequest, ChunkStream, ModelProvider, TokenUsage};
use crate::infra::config::ProviderConfig;
use crate::infra::errors::JieyouError;

/// Connect timeout for the upstream call. The stream itself has no deadline.
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct OpenAICompatProvider {
    id_str: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(id: impl Into<String>, api_key: String, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            id_str: id.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, JieyouError> {
        let api_key = config.api_key()?;
        Ok(Self::new(config.id.clone(), api_key, config.base_url.clone()))
    }

    fn error(&self, message: impl Into<String>) -> JieyouError {
        JieyouError::Provider {
            provider: self.id_str.clone(),
            message: message.into(),
        }
    }
}

/// Build the JSON body for a streaming completion request.
pub(crate) fn build_body(request: &ChatRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = serde_json::json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    body
}

/// Parse one SSE `data:` payload. `Ok(None)` means nothing worth yielding.
pub(crate) fn parse_event_data(data: &str) -> Result<Option<ChatChunk>, String> {
    let parsed: serde_json::Value =
        serde_json::from_str(data).map_err(|e| format!("Failed to parse SSE data: {e}"))?;

    if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
        let message = err["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(format!("Upstream error event: {message}"));
    }

    let delta = parsed["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let usage = if parsed["usage"].is_object() {
        Some(TokenUsage {
            input_tokens: parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        })
    } else {
        None
    };

    if delta.is_empty() && usage.is_none() {
        return Ok(None);
    }
    Ok(Some(ChatChunk { delta, usage }))
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, JieyouError> {
        let body = build_body(&request);
        let provider_id = self.id_str.clone();

        let mut es = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .eventsource()
            .map_err(|e| self.error(format!("Failed to build request: {e}")))?;

        let stream = async_stream::stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => {
                        if msg.data == "[DONE]" {
                            break;
                        }
                        match parse_event_data(&msg.data) {
                            Ok(Some(chunk)) => yield Ok(chunk),
                            Ok(None) => {}
                            Err(message) => {
                                yield Err(JieyouError::Provider {
                                    provider: provider_id.clone(),
                                    message,
                                });
                                break;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, resp)) => {
                        let body = resp.text().await.unwrap_or_default();
                        yield Err(JieyouError::Provider {
                            provider: provider_id.clone(),
                            message: format!("HTTP {status}: {body}"),
                        });
                        break;
                    }
                    Err(e) => {
                        yield Err(JieyouError::Provider {
                            provider: provider_id.clone(),
                            message: format!("SSE stream error: {e}"),
                        });
                        break;
                    }
                }
            }
            // EventSource reconnects on its own unless closed.
            es.close();
        };

        Ok(Box::pin(stream))
    }
}
