//! Chat orchestration
//!
//! Receives a user message, persists it, obtains an assistant reply
//! from the configured completion provider (degrading to a fixed
//! fallback on any provider failure), persists the reply, and keeps the
//! owning session record up to date.
//!
//! One orchestrator serves both anonymous and authenticated traffic,
//! parameterized by an optional viewer identity.

use crate::config::LlmConfig;
use crate::db::models::{ChatMessage, ChatSession, Sender};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::llm::{ChatTurn, CompletionProvider, Role, TokenStream, FALLBACK_REPLY};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Session titles are cut to this many characters, plus an ellipsis
const TITLE_MAX_CHARS: usize = 50;

/// Result of a completed message exchange
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub session_id: String,
    pub user_message: ChatMessage,
    pub ai_message: ChatMessage,
}

/// Chat orchestration service
#[derive(Clone)]
pub struct ChatService {
    repo: Repository,
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    history_limit: u64,
}

impl ChatService {
    /// Create a new chat service
    pub fn new(repo: Repository, provider: Arc<dyn CompletionProvider>, config: &LlmConfig) -> Self {
        Self {
            repo,
            provider,
            system_prompt: config.system_prompt.clone(),
            history_limit: config.history_limit as u64,
        }
    }

    /// Process one user message and return the full exchange
    pub async fn send_message(
        &self,
        session_id: Option<String>,
        viewer: Option<Uuid>,
        text: String,
    ) -> Result<ChatExchange> {
        let session_id = self.resolve_session(session_id, viewer).await?;

        let user_message = self
            .repo
            .insert_message(session_id.clone(), text.clone(), Sender::User)
            .await?;

        let turns = self.context_turns(&session_id).await?;
        let reply = self.generate_reply(&turns).await;

        let ai_message = self
            .repo
            .insert_message(session_id.clone(), reply, Sender::Ai)
            .await?;

        self.touch_session(&session_id, &text, viewer).await;
        crate::metrics::record_chat_exchange(false);

        Ok(ChatExchange {
            session_id,
            user_message,
            ai_message,
        })
    }

    /// Process one user message, delivering the assistant reply as an
    /// incremental token stream.
    ///
    /// The user message is persisted before the first token; the reply
    /// is persisted once the stream completes. A provider failure
    /// degrades to a single fallback token, never a request failure.
    pub async fn stream_message(
        &self,
        session_id: Option<String>,
        viewer: Option<Uuid>,
        text: String,
    ) -> Result<TokenStream> {
        let session_id = self.resolve_session(session_id, viewer).await?;

        self.repo
            .insert_message(session_id.clone(), text.clone(), Sender::User)
            .await?;

        let turns = self.context_turns(&session_id).await?;
        let service = self.clone();

        let stream = async_stream::stream! {
            let mut reply = String::new();
            let mut tokens = Box::pin(reply_tokens(
                service.provider.clone(),
                service.system_prompt.clone(),
                turns,
            ));

            while let Some(token) = tokens.next().await {
                reply.push_str(&token);
                yield Ok(token);
            }

            // The reply has already been delivered; persistence failures
            // here are logged, not surfaced.
            if let Err(e) = service
                .repo
                .insert_message(session_id.clone(), reply, Sender::Ai)
                .await
            {
                tracing::error!(session_id = %session_id, error = %e, "Failed to persist streamed reply");
            }

            service.touch_session(&session_id, &text, viewer).await;
            crate::metrics::record_chat_exchange(true);
        };

        Ok(Box::pin(stream))
    }

    /// Create or update the session record for a posted message.
    ///
    /// Failures are logged and swallowed: a session bookkeeping problem
    /// must never roll back the message writes that preceded it.
    pub async fn touch_session(&self, session_id: &str, first_message: &str, user_id: Option<Uuid>) {
        if let Err(e) = self.touch_session_inner(session_id, first_message, user_id).await {
            tracing::error!(session_id = %session_id, error = %e, "Failed to update session record");
        }
    }

    async fn touch_session_inner(
        &self,
        session_id: &str,
        first_message: &str,
        user_id: Option<Uuid>,
    ) -> Result<()> {
        match self.repo.find_session(session_id).await? {
            Some(_) => {
                self.repo.touch_session(session_id).await?;
            }
            None => {
                self.repo
                    .create_session(
                        session_id.to_string(),
                        user_id,
                        derive_title(first_message),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Sessions visible to the viewer, most recently updated first
    pub async fn list_sessions(&self, viewer: Option<Uuid>) -> Result<Vec<ChatSession>> {
        self.repo.list_sessions(viewer).await
    }

    /// Message history for a session, timestamp ascending.
    ///
    /// A session the viewer may not access answers as if it did not
    /// exist.
    pub async fn get_history(
        &self,
        session_id: &str,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ChatMessage>> {
        let session = self.repo.find_session(session_id).await?.ok_or_else(|| {
            AppError::SessionNotFound {
                id: session_id.to_string(),
            }
        })?;

        if !session.accessible_by(viewer) {
            return Err(AppError::SessionNotFound {
                id: session_id.to_string(),
            });
        }

        self.repo.list_messages(session_id).await
    }

    /// Delete a session and all its messages.
    ///
    /// Deleting a session that does not exist succeeds (idempotent);
    /// deleting another user's session answers as if it did not exist.
    pub async fn delete_session(&self, session_id: &str, viewer: Option<Uuid>) -> Result<()> {
        match self.repo.find_session(session_id).await? {
            None => Ok(()),
            Some(session) if !session.accessible_by(viewer) => Err(AppError::SessionNotFound {
                id: session_id.to_string(),
            }),
            Some(_) => self.repo.delete_session_with_messages(session_id).await,
        }
    }

    /// Resolve the target session id, generating one when absent and
    /// enforcing the ownership gate on existing sessions
    async fn resolve_session(
        &self,
        session_id: Option<String>,
        viewer: Option<Uuid>,
    ) -> Result<String> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(session) = self.repo.find_session(&session_id).await? {
            if !session.accessible_by(viewer) {
                return Err(AppError::SessionNotFound { id: session_id });
            }
        }

        Ok(session_id)
    }

    /// The most recent messages of the session as provider context,
    /// oldest first
    async fn context_turns(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let messages = self
            .repo
            .recent_messages(session_id, self.history_limit)
            .await?;

        Ok(messages.iter().map(turn_from_message).collect())
    }

    async fn generate_reply(&self, turns: &[ChatTurn]) -> String {
        complete_with_fallback(self.provider.as_ref(), &self.system_prompt, turns).await
    }
}

/// Obtain a single-shot reply, substituting the apology fallback when
/// the provider fails
async fn complete_with_fallback(
    provider: &dyn CompletionProvider,
    system_prompt: &str,
    turns: &[ChatTurn],
) -> String {
    let start = Instant::now();

    match provider.complete(system_prompt, turns).await {
        Ok(reply) => {
            crate::metrics::record_completion(
                start.elapsed().as_secs_f64(),
                provider.model_name(),
                true,
            );
            reply
        }
        Err(e) => {
            tracing::warn!(error = %e, "Completion provider failed, using fallback reply");
            crate::metrics::record_completion(
                start.elapsed().as_secs_f64(),
                provider.model_name(),
                false,
            );
            FALLBACK_REPLY.to_string()
        }
    }
}

/// Tokens of a streamed reply.
///
/// A provider that fails at open, or before delivering its first
/// token, degrades to a single fallback token. A failure mid-reply
/// ends the stream with what was already delivered.
fn reply_tokens(
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    turns: Vec<ChatTurn>,
) -> impl futures::Stream<Item = String> + Send {
    async_stream::stream! {
        match provider.complete_stream(&system_prompt, &turns).await {
            Ok(mut tokens) => {
                let mut delivered = false;
                while let Some(token) = tokens.next().await {
                    match token {
                        Ok(token) => {
                            delivered = true;
                            yield token;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Completion stream failed mid-reply");
                            if !delivered {
                                yield FALLBACK_REPLY.to_string();
                            }
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Completion provider unavailable, using fallback");
                yield FALLBACK_REPLY.to_string();
            }
        }
    }
}

/// Derive a session title from its first message: the first 50
/// characters, with an ellipsis marker when truncated
pub fn derive_title(first_message: &str) -> String {
    let mut chars = first_message.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();

    if chars.next().is_some() {
        format!("{}...", title)
    } else {
        title
    }
}

fn turn_from_message(message: &ChatMessage) -> ChatTurn {
    let role = match message.sender() {
        Sender::User => Role::User,
        Sender::Ai => Role::Assistant,
    };
    ChatTurn::new(role, message.message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Provider that fails every request, for exercising degradation
    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        async fn complete(&self, _system_prompt: &str, _turns: &[ChatTurn]) -> crate::errors::Result<String> {
            Err(AppError::Upstream {
                message: "connection refused".to_string(),
            })
        }

        async fn complete_stream(
            &self,
            _system_prompt: &str,
            _turns: &[ChatTurn],
        ) -> crate::errors::Result<TokenStream> {
            Err(AppError::Upstream {
                message: "connection refused".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    /// Provider whose stream dies partway through the reply
    struct TruncatingProvider {
        tokens_before_failure: Vec<String>,
    }

    #[async_trait]
    impl CompletionProvider for TruncatingProvider {
        async fn complete(&self, _system_prompt: &str, _turns: &[ChatTurn]) -> crate::errors::Result<String> {
            Err(AppError::Upstream {
                message: "connection reset".to_string(),
            })
        }

        async fn complete_stream(
            &self,
            _system_prompt: &str,
            _turns: &[ChatTurn],
        ) -> crate::errors::Result<TokenStream> {
            let items: Vec<crate::errors::Result<String>> = self
                .tokens_before_failure
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(AppError::Upstream {
                    message: "connection reset".to_string(),
                })))
                .collect();

            Ok(Box::pin(futures::stream::iter(items)))
        }

        fn model_name(&self) -> &str {
            "truncating"
        }
    }

    fn turns() -> Vec<ChatTurn> {
        vec![ChatTurn::new(Role::User, "hello")]
    }

    #[tokio::test]
    async fn test_single_shot_falls_back_on_provider_error() {
        let reply = complete_with_fallback(&FailingProvider, "system", &turns()).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_single_shot_passes_through_provider_reply() {
        let reply = complete_with_fallback(&crate::llm::EchoProvider, "system", &turns()).await;
        assert_eq!(reply, "Echo: hello");
    }

    #[tokio::test]
    async fn test_stream_falls_back_when_provider_unavailable() {
        let tokens: Vec<String> =
            reply_tokens(Arc::new(FailingProvider), "system".into(), turns())
                .collect()
                .await;
        assert_eq!(tokens, vec![FALLBACK_REPLY.to_string()]);
    }

    #[tokio::test]
    async fn test_stream_falls_back_when_failing_before_first_token() {
        let provider = TruncatingProvider {
            tokens_before_failure: vec![],
        };
        let tokens: Vec<String> =
            reply_tokens(Arc::new(provider), "system".into(), turns())
                .collect()
                .await;
        assert_eq!(tokens, vec![FALLBACK_REPLY.to_string()]);
    }

    #[tokio::test]
    async fn test_stream_keeps_delivered_tokens_on_mid_reply_failure() {
        let provider = TruncatingProvider {
            tokens_before_failure: vec!["Hel".into(), "lo".into()],
        };
        let tokens: Vec<String> =
            reply_tokens(Arc::new(provider), "system".into(), turns())
                .collect()
                .await;
        // No fallback appended once real tokens have been delivered
        assert_eq!(tokens, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[test]
    fn test_derive_title_short_message_verbatim() {
        let message = "Hello, this is a test message.";
        assert_eq!(derive_title(message), message);
    }

    #[test]
    fn test_derive_title_exactly_fifty_chars() {
        let message = "a".repeat(50);
        assert_eq!(derive_title(&message), message);
    }

    #[test]
    fn test_derive_title_fifty_one_chars_truncated() {
        let message = "a".repeat(51);
        let title = derive_title(&message);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn test_derive_title_counts_characters_not_bytes() {
        // 51 two-byte characters must not split a UTF-8 boundary
        let message = "é".repeat(51);
        let title = derive_title(&message);
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn test_turn_from_message_maps_roles() {
        let base = ChatMessage {
            id: Uuid::new_v4(),
            session_id: "s1".into(),
            message: "hi".into(),
            sender: "user".into(),
            timestamp: Utc::now().into(),
        };
        assert_eq!(turn_from_message(&base).role, Role::User);

        let ai = ChatMessage {
            sender: "ai".into(),
            ..base
        };
        assert_eq!(turn_from_message(&ai).role, Role::Assistant);
    }
}
