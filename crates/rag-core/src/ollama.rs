//! Native Ollama client for embeddings and chat. Wraps ollama-rs behind [`LlmClient`].

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage as OllamaMessage;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use url::Url;

use crate::llm::{ChatMessage, LlmClient, LlmError, Role};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
}

impl OllamaClient {
    /// Create from a URL string, e.g. `http://localhost:11434`.
    /// The `/v1` suffix of Ollama's OpenAI-compatible root is accepted and dropped.
    pub fn from_url(url: &str) -> Result<Self, LlmError> {
        let root = native_root(url)?;
        let inner = Ollama::try_new(root.as_str())?;
        Ok(Self { inner })
    }
}

fn native_root(url: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(url)?;
    let path = url.path().trim_end_matches('/');
    let trimmed = path.strip_suffix("/v1").unwrap_or(path).to_string();
    url.set_path(&trimmed);
    Ok(url)
}

fn to_ollama(message: &ChatMessage) -> OllamaMessage {
    match message.role {
        Role::System => OllamaMessage::system(message.content.clone()),
        Role::User => OllamaMessage::user(message.content.clone()),
        Role::Assistant => OllamaMessage::assistant(message.content.clone()),
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LlmError> {
        let req = GenerateEmbeddingsRequest::new(
            model.to_string(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let res = self.inner.generate_embeddings(req).await?;
        res.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("Ollama returned no embedding".to_string()))
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        let req = ChatMessageRequest::new(
            model.to_string(),
            messages.iter().map(to_ollama).collect(),
        )
        .options(ModelOptions::default().temperature(temperature));
        let res = self.inner.send_chat_messages(req).await?;
        Ok(res.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_openai_suffix() {
        assert_eq!(
            native_root("http://localhost:11434/v1").unwrap().as_str(),
            "http://localhost:11434/"
        );
        assert_eq!(
            native_root("http://gpu-box:11434/v1/").unwrap().as_str(),
            "http://gpu-box:11434/"
        );
        assert_eq!(
            native_root("http://localhost:11434").unwrap().as_str(),
            "http://localhost:11434/"
        );
    }

    #[test]
    fn keeps_proxy_prefix() {
        assert_eq!(
            native_root("https://example.com/ollama/v1").unwrap().as_str(),
            "https://example.com/ollama"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(OllamaClient::from_url("::not a url::").is_err());
    }
}
