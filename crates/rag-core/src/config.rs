//! Persisted config (`rag.yaml`) in the working directory.
//!
//! One file per project folder: which documents to index, how to chunk them,
//! and which models/endpoint to use for embeddings and answers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "rag.yaml";

/// Which wire protocol the LLM endpoint speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible HTTP API (`/embeddings`, `/chat/completions`).
    #[default]
    OpenAi,
    /// Native Ollama API.
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Folder with the user's documents.
    pub folder_path: PathBuf,
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows. Must be below `chunk_size`.
    pub overlap: usize,
    pub embedding_model: String,
    pub chat_model: String,
    /// Directory names pruned anywhere below `folder_path`.
    pub ignore_dirs: Vec<String>,
    pub provider: Provider,
    pub client_base_url: String,
    /// May be a placeholder for local services.
    pub client_api_key: String,
    pub request_timeout_secs: u64,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            folder_path: PathBuf::new(),
            chunk_size: 1000,
            overlap: 200,
            embedding_model: "nomic-embed-text".to_string(),
            chat_model: "deepseek-r1:1.5b".to_string(),
            ignore_dirs: [".git", "node_modules", "venv", "__pycache__", ".rag_index"]
                .into_iter()
                .map(String::from)
                .collect(),
            provider: Provider::OpenAi,
            client_base_url: "http://localhost:11434/v1".to_string(),
            client_api_key: "ollama".to_string(),
            request_timeout_secs: 120,
            top_k: 5,
        }
    }
}

impl RagConfig {
    /// Default config for the given documents folder.
    pub fn new(folder_path: impl Into<PathBuf>) -> Self {
        Self {
            folder_path: folder_path.into(),
            ..Self::default()
        }
    }

    /// Checks the values a build relies on. Called on load; call it again after editing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folder_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingFolder);
        }
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        url::Url::parse(&self.client_base_url).map_err(ConfigError::InvalidUrl)?;
        Ok(())
    }
}

/// Path of the config file inside `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILENAME)
}

/// Load config from `dir`. Returns `Ok(None)` if there is no config file yet.
pub fn load_config(dir: &Path) -> Result<Option<RagConfig>, ConfigError> {
    let path = config_path(dir);
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Read(e)),
    };
    let config: RagConfig = serde_yaml::from_str(&s).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(Some(config))
}

/// Save config to `dir`, replacing any existing file.
pub fn save_config(dir: &Path, config: &RagConfig) -> Result<(), ConfigError> {
    let s = serde_yaml::to_string(config).map_err(ConfigError::Serialize)?;
    std::fs::write(config_path(dir), s).map_err(ConfigError::Write)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to parse rag.yaml: {0}")]
    Parse(serde_yaml::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(serde_yaml::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("folder_path is not set")]
    MissingFolder,
    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size}), and chunk_size must be positive")]
    InvalidChunking { chunk_size: usize, overlap: usize },
    #[error("top_k must be positive")]
    InvalidTopK,
    #[error("invalid client_base_url: {0}")]
    InvalidUrl(url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::new("docs");
        config.provider = Provider::Ollama;
        config.chunk_size = 500;
        save_config(dir.path(), &config).unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), Some(config));
    }

    #[test]
    fn partial_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(config_path(dir.path()), "folder_path: notes\noverlap: 50\n").unwrap();
        let config = load_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.folder_path, PathBuf::from("notes"));
        assert_eq!(config.overlap, 50);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.provider, Provider::OpenAi);
        assert!(config.ignore_dirs.iter().any(|d| d == ".rag_index"));
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        let mut config = RagConfig::new("docs");
        config.overlap = config.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn folder_is_required() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(config_path(dir.path()), "chunk_size: 10\noverlap: 2\n").unwrap();
        assert!(matches!(
            load_config(dir.path()),
            Err(ConfigError::MissingFolder)
        ));
    }

    #[test]
    fn bad_url_rejected() {
        let mut config = RagConfig::new("docs");
        config.client_base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
    }
}
