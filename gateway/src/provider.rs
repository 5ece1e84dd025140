//! The uniform `Provider` trait every model call goes through, plus the
//! two backends the resilience pipeline is tested against: a deterministic
//! `MockProvider` and a generic JSON-over-HTTP `HttpProvider`. Concrete
//! vendor wire codecs are out of scope -- both backends speak the same
//! Chat/Embed shape the pipeline assumes.

use async_trait::async_trait;
use forge_core::ModelConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vectors: Vec<Vec<f32>>,
    pub usage: Usage,
}

/// Classification-carrying error from a single provider attempt. The retry
/// policy consults [`ProviderCallError::is_retryable`] to decide whether to
/// try again.
#[derive(Debug, Clone)]
pub enum ProviderCallError {
    Http { status: u16, message: String },
    Cancelled,
    Other(String),
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderCallError::Http { status, message } => write!(f, "http {status}: {message}"),
            ProviderCallError::Cancelled => write!(f, "cancelled"),
            ProviderCallError::Other(m) => write!(f, "{m}"),
        }
    }
}

impl ProviderCallError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderCallError::Http { status, .. }
                if matches!(status, 429 | 500 | 502 | 503 | 504)
        )
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderCallError>;
    async fn complete(&self, req: &CompleteRequest) -> Result<ChatResponse, ProviderCallError>;
    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderCallError>;
}

/// Deterministic canned-response backend used by tests and `LLM_MODE=mock`.
/// Never makes a network call; token counts are derived from content length
/// so cost accounting still has something plausible to charge.
pub struct MockProvider;

impl MockProvider {
    fn usage_for(prompt_len: usize, completion_len: usize) -> Usage {
        Usage {
            prompt_tokens: (prompt_len / 4).max(1) as u64,
            completion_tokens: (completion_len / 4).max(1) as u64,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderCallError> {
        let prompt_len: usize = req.messages.iter().map(|m| m.content.len()).sum();
        let content = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| format!("echo: {}", m.content))
            .unwrap_or_else(|| "echo: (empty)".to_string());
        Ok(ChatResponse {
            usage: Self::usage_for(prompt_len, content.len()),
            content,
        })
    }

    async fn complete(&self, req: &CompleteRequest) -> Result<ChatResponse, ProviderCallError> {
        let content = format!("echo: {}", req.prompt);
        Ok(ChatResponse {
            usage: Self::usage_for(req.prompt.len(), content.len()),
            content,
        })
    }

    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderCallError> {
        let vectors = req
            .input
            .iter()
            .map(|s| {
                let mut v = vec![0.0f32; 8];
                for (i, b) in s.bytes().enumerate() {
                    v[i % 8] += b as f32;
                }
                v
            })
            .collect();
        let prompt_len: usize = req.input.iter().map(|s| s.len()).sum();
        Ok(EmbedResponse {
            vectors,
            usage: Usage {
                prompt_tokens: (prompt_len / 4).max(1) as u64,
                completion_tokens: 0,
            },
        })
    }
}

/// Generic JSON-over-HTTP backend configured entirely from a
/// [`ModelConfig`]. Posts `{model, messages/prompt/input, ...}` to
/// `base_url` and expects back a uniform `{content, usage}` /
/// `{vectors, usage}` shape -- it does not know about any vendor-specific
/// request/response envelope.
pub struct HttpProvider {
    client: reqwest::Client,
    config: ModelConfig,
}

impl HttpProvider {
    pub fn new(client: reqwest::Client, config: ModelConfig) -> Self {
        HttpProvider { client, config }
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env).ok()
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut req = self.client.post(&self.config.base_url);
        if let Some(key) = self.api_key() {
            req = req.bearer_auth(key);
        }
        req
    }

    fn classify(err: reqwest::Error) -> ProviderCallError {
        if err.is_timeout() || err.is_connect() {
            return ProviderCallError::Http {
                status: 503,
                message: err.to_string(),
            };
        }
        ProviderCallError::Other(err.to_string())
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderCallError> {
        let resp = self
            .request()
            .json(req)
            .send()
            .await
            .map_err(Self::classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderCallError::Http {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json::<ChatResponse>()
            .await
            .map_err(|e| ProviderCallError::Other(e.to_string()))
    }

    async fn complete(&self, req: &CompleteRequest) -> Result<ChatResponse, ProviderCallError> {
        let resp = self
            .request()
            .json(req)
            .send()
            .await
            .map_err(Self::classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderCallError::Http {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json::<ChatResponse>()
            .await
            .map_err(|e| ProviderCallError::Other(e.to_string()))
    }

    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderCallError> {
        let resp = self
            .request()
            .json(req)
            .send()
            .await
            .map_err(Self::classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderCallError::Http {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json::<EmbedResponse>()
            .await
            .map_err(|e| ProviderCallError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_echoes_last_user_message() {
        let provider = MockProvider;
        let req = ChatRequest {
            model: "mock:gpt-mini".into(),
            messages: vec![Message {
                role: MessageRole::User,
                content: "hello".into(),
            }],
            tools: vec![],
            temperature: None,
            top_p: None,
            max_tokens: None,
        };
        let resp = provider.chat(&req).await.unwrap();
        assert_eq!(resp.content, "echo: hello");
        assert!(resp.usage.prompt_tokens >= 1);
    }

    #[test]
    fn retryable_status_codes_are_classified_correctly() {
        for status in [429, 500, 502, 503, 504] {
            let err = ProviderCallError::Http {
                status,
                message: "x".into(),
            };
            assert!(err.is_retryable());
        }
        let err = ProviderCallError::Http {
            status: 400,
            message: "x".into(),
        };
        assert!(!err.is_retryable());
    }
}
