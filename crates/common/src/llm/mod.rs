//! LLM completion provider abstraction
//!
//! Provides a unified interface over completion backends:
//! - OpenAI-compatible chat completion APIs (single-shot and token streaming)
//! - A deterministic echo provider used when no live provider is configured
//!
//! Provider failures are recoverable by design: callers degrade to
//! [`FALLBACK_REPLY`] instead of failing the request.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Substitute assistant reply when the provider is unreachable or errors
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble reaching the assistant right now. Please try again in a moment.";

/// Conversation role in a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One ordered role/content pair of conversation context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Incremental token stream from a completion provider
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for assistant reply generation
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a single completion for the given conversation
    async fn complete(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String>;

    /// Generate a completion as an incremental token stream
    async fn complete_stream(&self, system_prompt: &str, turns: &[ChatTurn])
        -> Result<TokenStream>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible provider
// ============================================================================

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl OpenAiProvider {
    /// Create a new provider client
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        }
    }

    fn build_messages(system_prompt: &str, turns: &[ChatTurn]) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatTurn::new(Role::System, system_prompt));
        messages.extend(turns.iter().cloned());
        messages
    }

    async fn send_request(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = CompletionRequest {
            model: &self.model,
            messages: Self::build_messages(system_prompt, turns),
            stream: stream.then_some(true),
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                message: format!("Completion request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                message: format!("Completion API error {}: {}", status, body),
            });
        }

        Ok(response)
    }
}

/// Extract the payload of one SSE line (`data: {...}`), if any
fn parse_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Pull the delta token out of one streaming completion chunk
fn extract_delta(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(String::from)
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String> {
        let response = self.send_request(system_prompt, turns, false).await?;

        let result: CompletionResponse = response.json().await.map_err(|e| AppError::Upstream {
            message: format!("Failed to parse completion response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream {
                message: "Empty completion response".to_string(),
            })
    }

    async fn complete_stream(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<TokenStream> {
        let response = self.send_request(system_prompt, turns, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| AppError::Upstream {
                    message: format!("Completion stream error: {}", e),
                })?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete lines, keep the remainder buffered
                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    let Some(payload) = parse_sse_data(line.trim_end()) else {
                        continue;
                    };

                    if payload == "[DONE]" {
                        return;
                    }
                    if let Some(token) = extract_delta(payload) {
                        yield token;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Echo provider
// ============================================================================

/// Deterministic placeholder provider, used when no live completion
/// provider is configured
pub struct EchoProvider;

impl EchoProvider {
    fn reply(turns: &[ChatTurn]) -> String {
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        format!("Echo: {}", last_user)
    }
}

#[async_trait]
impl CompletionProvider for EchoProvider {
    async fn complete(&self, _system_prompt: &str, turns: &[ChatTurn]) -> Result<String> {
        Ok(Self::reply(turns))
    }

    async fn complete_stream(
        &self,
        _system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<TokenStream> {
        let reply = Self::reply(turns);
        let words: Vec<String> = reply
            .split_inclusive(' ')
            .map(String::from)
            .collect();

        Ok(Box::pin(futures::stream::iter(words.into_iter().map(Ok))))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

/// Create a completion provider based on configuration
pub fn create_provider(config: &LlmConfig) -> Arc<dyn CompletionProvider> {
    match (config.provider.as_str(), config.api_key.clone()) {
        ("openai", Some(api_key)) => Arc::new(OpenAiProvider::new(
            api_key,
            config.model.clone(),
            config.api_base.clone(),
            config.timeout_secs,
        )),
        ("openai", None) => {
            tracing::warn!("LLM provider 'openai' selected without an API key, using echo");
            Arc::new(EchoProvider)
        }
        ("echo", _) => Arc::new(EchoProvider),
        (other, _) => {
            tracing::warn!(provider = other, "Unknown completion provider, using echo");
            Arc::new(EchoProvider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_echo_provider_is_deterministic() {
        let provider = EchoProvider;
        let turns = vec![ChatTurn::new(Role::User, "Hello there")];

        let first = provider.complete("system", &turns).await.unwrap();
        let second = provider.complete("system", &turns).await.unwrap();
        assert_eq!(first, "Echo: Hello there");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_echo_provider_uses_last_user_turn() {
        let provider = EchoProvider;
        let turns = vec![
            ChatTurn::new(Role::User, "first"),
            ChatTurn::new(Role::Assistant, "Echo: first"),
            ChatTurn::new(Role::User, "second"),
        ];

        let reply = provider.complete("system", &turns).await.unwrap();
        assert_eq!(reply, "Echo: second");
    }

    #[tokio::test]
    async fn test_echo_stream_reassembles_to_reply() {
        let provider = EchoProvider;
        let turns = vec![ChatTurn::new(Role::User, "stream me please")];

        let stream = provider.complete_stream("system", &turns).await.unwrap();
        let tokens: Vec<String> = stream.try_collect().await.unwrap();

        assert!(tokens.len() > 1);
        assert_eq!(tokens.concat(), "Echo: stream me please");
    }

    #[test]
    fn test_parse_sse_data() {
        assert_eq!(parse_sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(parse_sse_data("event: error"), None);
        assert_eq!(parse_sse_data(""), None);
    }

    #[test]
    fn test_extract_delta() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(extract_delta(payload), Some("Hel".to_string()));

        // Keepalive chunks without content are skipped
        let keepalive = r#"{"choices":[{"delta":{}}]}"#;
        assert_eq!(extract_delta(keepalive), None);

        assert_eq!(extract_delta("not json"), None);
    }

    #[test]
    fn test_build_messages_prepends_system() {
        let turns = vec![ChatTurn::new(Role::User, "hi")];
        let messages = OpenAiProvider::build_messages("be helpful", &turns);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be helpful");
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&ChatTurn::new(Role::Assistant, "x")).unwrap(),
            r#"{"role":"assistant","content":"x"}"#
        );
    }
}
