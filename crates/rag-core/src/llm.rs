//! The seam to the model server: one embedding call and one chat call.
//!
//! [`client_from_config`] picks the provider named in the config. Everything else in the
//! crate holds an `Arc<dyn LlmClient>`, which is also how tests swap in a scripted fake.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Provider, RagConfig};
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Embed one text with `model`. Returns the raw vector as the server sent it.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LlmError>;

    /// One chat completion. Returns the assistant message text.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError>;
}

/// Build the client for the provider and endpoint in `config`.
pub fn client_from_config(config: &RagConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    Ok(match config.provider {
        Provider::OpenAi => Arc::new(OpenAiClient::new(
            &config.client_base_url,
            &config.client_api_key,
            config.request_timeout_secs,
        )?),
        Provider::Ollama => Arc::new(OllamaClient::from_url(&config.client_base_url)?),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Ollama request failed: {0}")]
    Ollama(#[from] ollama_rs::error::OllamaError),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-process client for tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Semaphore;

    use super::*;

    /// Embeds text into `[len, count of 'a', count of 'b']` (case-insensitive) unless
    /// scripted otherwise.
    #[derive(Default)]
    pub struct FakeClient {
        /// Texts whose embedding call fails.
        pub fail_on: Vec<String>,
        /// Fixed vectors for specific texts.
        pub vectors: HashMap<String, Vec<f32>>,
        /// When set, every embed call waits for a permit first.
        pub gate: Option<Arc<Semaphore>>,
        pub calls: AtomicUsize,
        pub seen: parking_lot::Mutex<Vec<String>>,
    }

    impl FakeClient {
        pub fn gated() -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let client = Self {
                gate: Some(gate.clone()),
                ..Self::default()
            };
            (client, gate)
        }

        pub fn default_vector(text: &str) -> Vec<f32> {
            vec![
                text.chars().count() as f32,
                text.chars().filter(|c| c.eq_ignore_ascii_case(&'a')).count() as f32,
                text.chars().filter(|c| c.eq_ignore_ascii_case(&'b')).count() as f32,
            ]
        }
    }

    #[async_trait]
    impl LlmClient for FakeClient {
        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, LlmError> {
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))?
                    .forget();
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(text.to_string());
            if self.fail_on.iter().any(|t| t == text) {
                return Err(LlmError::InvalidResponse(format!("refused {text:?}")));
            }
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| Self::default_vector(text)))
        }

        async fn chat(
            &self,
            model: &str,
            messages: &[ChatMessage],
            _temperature: f32,
        ) -> Result<String, LlmError> {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("[{model}] {last}"))
        }
    }
}
