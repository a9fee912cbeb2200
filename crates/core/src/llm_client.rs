use crate::session::{Role, SessionError, Turn};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Model selection and sampling parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub model: String,
    /// Sampling randomness, in `[0, 2]`.
    pub temperature: f32,
    /// Cap on the reply length.
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl CompletionSettings {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.model.trim().is_empty() {
            return Err(SessionError::Validation("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(SessionError::Validation(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(SessionError::Validation(
                "max_tokens must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Failure of the external completion service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limit reached: {0}")]
    RateLimited(String),
    #[error("provider server error: {0}")]
    Server(String),
    #[error("request rejected: {0}")]
    InvalidRequest(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::Server(_))
    }
}

/// Transport failures never carry an HTTP status here: the client reads the
/// status itself and reports non-success bodies as `ApiError`.
fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::MalformedResponse(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

impl From<OpenAIError> for ProviderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => classify_transport(&e),
            // 5xx bodies are not guaranteed to be JSON, so the client wraps
            // them raw with neither type nor code set.
            OpenAIError::ApiError(api) if api.r#type.is_none() && api.code.is_none() => {
                ProviderError::Server(api.message)
            }
            OpenAIError::ApiError(api) => {
                let kind = format!(
                    "{} {}",
                    api.r#type.as_deref().unwrap_or_default(),
                    api.code.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                if kind.contains("invalid_api_key")
                    || kind.contains("auth")
                    || kind.contains("permission")
                {
                    ProviderError::Auth(api.message)
                } else if kind.contains("rate_limit") || kind.contains("insufficient_quota") {
                    ProviderError::RateLimited(api.message)
                } else if kind.contains("server_error") || kind.contains("overloaded") {
                    ProviderError::Server(api.message)
                } else {
                    ProviderError::InvalidRequest(api.message)
                }
            }
            OpenAIError::JSONDeserialize(e) => ProviderError::MalformedResponse(e.to_string()),
            other => ProviderError::InvalidRequest(other.to_string()),
        }
    }
}

/// Produces the partner's next reply for a conversation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// Sends the whole turn log, system directive first, and returns the reply text.
    async fn complete(
        &self,
        turns: &[Turn],
        settings: &CompletionSettings,
    ) -> Result<String, ProviderError>;
}

/// A [`TurnExecutor`] for any OpenAI-compatible chat completions API.
pub struct OpenAICompatibleExecutor {
    client: Client<OpenAIConfig>,
}

impl OpenAICompatibleExecutor {
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the OpenAI-compatible service.
    ///
    /// The client's own backoff is disabled so that a failed request returns
    /// at once; bounded retries belong to [`crate::retry::RetryingExecutor`].
    pub fn new(config: OpenAIConfig) -> Self {
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        Self {
            client: Client::with_config(config).with_backoff(no_retry),
        }
    }
}

/// Maps turns onto chat messages; partner turns become assistant messages.
pub fn to_request_messages(
    turns: &[Turn],
) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
    turns
        .iter()
        .map(|turn| {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
                Role::Partner => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
            };
            Ok(message)
        })
        .collect()
}

/// Pulls the trimmed reply text out of a completion response.
pub fn reply_text(response: &CreateChatCompletionResponse) -> Result<String, ProviderError> {
    let content = response
        .choices
        .first()
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?
        .message
        .content
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "response had no text content".into(),
        ));
    }
    Ok(content.to_string())
}

#[async_trait]
impl TurnExecutor for OpenAICompatibleExecutor {
    async fn complete(
        &self,
        turns: &[Turn],
        settings: &CompletionSettings,
    ) -> Result<String, ProviderError> {
        #[allow(deprecated)]
        let request = CreateChatCompletionRequestArgs::default()
            .model(&settings.model)
            .messages(to_request_messages(turns)?)
            .temperature(settings.temperature)
            .max_tokens(settings.max_tokens)
            .n(1)
            .build()?;

        debug!(model = %settings.model, messages = turns.len(), "Requesting chat completion");
        let response = self.client.chat().create(request).await?;
        reply_text(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RetryPolicy, RetryingExecutor};
    use async_openai::error::ApiError;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Answers every request with a plain-text 503 and counts the requests.
    async fn unavailable_upstream() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    read_request(&mut stream).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    let body = "upstream unavailable";
                    let response = format!(
                        "HTTP/1.1 503 Service Unavailable\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        (format!("http://{addr}/v1"), hits)
    }

    fn local_executor(api_base: String) -> OpenAICompatibleExecutor {
        OpenAICompatibleExecutor::new(
            OpenAIConfig::new()
                .with_api_key("sk-test")
                .with_api_base(api_base),
        )
    }

    fn api_error(r#type: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: "boom".to_string(),
            r#type: r#type.map(String::from),
            param: None,
            code: code.map(String::from),
        })
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = CompletionSettings::default();
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.max_tokens, 512);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let base = CompletionSettings::default();
        for temperature in [-0.1, 2.01, f32::NAN] {
            let settings = CompletionSettings {
                temperature,
                ..base.clone()
            };
            assert!(settings.validate().is_err(), "temperature {temperature}");
        }
        for temperature in [0.0, 2.0] {
            let settings = CompletionSettings {
                temperature,
                ..base.clone()
            };
            assert!(settings.validate().is_ok());
        }

        let zero_tokens = CompletionSettings {
            max_tokens: 0,
            ..base.clone()
        };
        assert!(zero_tokens.validate().is_err());

        let no_model = CompletionSettings {
            model: "  ".into(),
            ..base
        };
        assert!(no_model.validate().is_err());
    }

    #[test]
    fn test_only_network_and_server_errors_are_transient() {
        assert!(ProviderError::Network("x".into()).is_transient());
        assert!(ProviderError::Server("x".into()).is_transient());
        assert!(!ProviderError::Auth("x".into()).is_transient());
        assert!(!ProviderError::RateLimited("x".into()).is_transient());
        assert!(!ProviderError::InvalidRequest("x".into()).is_transient());
        assert!(!ProviderError::MalformedResponse("x".into()).is_transient());
    }

    #[test]
    fn test_api_errors_are_classified() {
        assert_eq!(
            ProviderError::from(api_error(Some("invalid_request_error"), Some("invalid_api_key"))),
            ProviderError::Auth("boom".into())
        );
        assert_eq!(
            ProviderError::from(api_error(Some("requests"), Some("rate_limit_exceeded"))),
            ProviderError::RateLimited("boom".into())
        );
        assert_eq!(
            ProviderError::from(api_error(Some("server_error"), None)),
            ProviderError::Server("boom".into())
        );
        assert_eq!(
            ProviderError::from(api_error(Some("invalid_request_error"), None)),
            ProviderError::InvalidRequest("boom".into())
        );
    }

    #[test]
    fn test_untyped_api_error_is_a_transient_server_error() {
        let err = ProviderError::from(OpenAIError::ApiError(ApiError {
            message: "Bad Gateway".to_string(),
            r#type: None,
            param: None,
            code: None,
        }));
        assert_eq!(err, ProviderError::Server("Bad Gateway".into()));
        assert!(err.is_transient());
    }

    #[test]
    fn test_turns_map_to_chat_roles() {
        let turns = vec![
            Turn::system("You are Principal Ziegler."),
            Turn::user("Good morning."),
            Turn::partner("Good morning, come in."),
        ];
        let messages = to_request_messages(&turns).unwrap();
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_reply_text_trims_and_rejects_empty() {
        let response = |content: Option<&str>| -> CreateChatCompletionResponse {
            serde_json::from_value(serde_json::json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 0,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": content },
                    "finish_reason": "stop"
                }]
            }))
            .unwrap()
        };

        assert_eq!(reply_text(&response(Some("  Hello.\n"))).unwrap(), "Hello.");
        assert!(matches!(
            reply_text(&response(Some("   "))),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            reply_text(&response(None)),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_upstream_fails_after_a_single_request() {
        let (api_base, hits) = unavailable_upstream().await;
        let executor = local_executor(api_base);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            executor.complete(&[Turn::user("hi")], &CompletionSettings::default()),
        )
        .await
        .expect("client kept retrying on its own");

        assert!(matches!(result, Err(ProviderError::Server(_))), "{result:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrying_executor_bounds_attempts_against_upstream() {
        let (api_base, hits) = unavailable_upstream().await;
        let executor = RetryingExecutor::new(
            local_executor(api_base),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
            },
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            executor.complete(&[Turn::user("hi")], &CompletionSettings::default()),
        )
        .await
        .expect("retries were not bounded");

        assert!(matches!(result, Err(ProviderError::Server(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
