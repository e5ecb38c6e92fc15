use crate::chunking::ChunkingConfig;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::query::{DEFAULT_INSTRUCTIONS, DEFAULT_TOP_K};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const STORE_DIR: &str = "embeddings_db";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hashed character trigrams computed in-process.
    #[default]
    Ngram,
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ngram" => Ok(Self::Ngram),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Invalid(format!(
                "unknown embedding provider {other:?}, expected \"ngram\" or \"ollama\""
            ))),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ngram => f.write_str("ngram"),
            Self::Ollama => f.write_str("ollama"),
        }
    }
}

/// Everything the service reads at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagConfig {
    pub index_path: PathBuf,
    pub embedding_provider: EmbeddingProvider,
    /// Required for Ollama embeddings; the ngram embedder names itself.
    pub embedding_model: Option<String>,
    /// Defaults to the language model host.
    pub embedding_host: Option<String>,
    /// Defaults to the language model port.
    pub embedding_port: Option<u16>,
    pub docs_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub llm_model: String,
    pub llm_host: String,
    pub llm_port: u16,
    pub prompt_template: String,
    pub top_k: usize,
    pub llm_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("./index/"),
            embedding_provider: EmbeddingProvider::default(),
            embedding_model: None,
            embedding_host: None,
            embedding_port: None,
            docs_path: PathBuf::from("./localdocs/"),
            chunking: ChunkingConfig::default(),
            llm_model: "llama3.2:1b".to_string(),
            llm_host: "ollama".to_string(),
            llm_port: 11434,
            prompt_template: DEFAULT_INSTRUCTIONS.to_string(),
            top_k: DEFAULT_TOP_K,
            llm_timeout_secs: 120,
            embedding_timeout_secs: 30,
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .validate()
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.llm_model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm model must not be empty".to_string()));
        }
        if self.llm_timeout_secs == 0 || self.embedding_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".to_string()));
        }
        if self.embedding_provider == EmbeddingProvider::Ollama
            && self
                .embedding_model
                .as_deref()
                .map_or(true, |model| model.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "the ollama embedding provider needs an embedding model".to_string(),
            ));
        }

        self.llm_base_url()?;
        self.embedding_base_url()?;
        Ok(())
    }

    /// Root directory of the vector store.
    pub fn store_root(&self) -> PathBuf {
        self.index_path.join(STORE_DIR)
    }

    pub fn llm_base_url(&self) -> Result<Url, ConfigError> {
        base_url(&self.llm_host, self.llm_port)
    }

    pub fn embedding_base_url(&self) -> Result<Url, ConfigError> {
        base_url(
            self.embedding_host.as_deref().unwrap_or(&self.llm_host),
            self.embedding_port.unwrap_or(self.llm_port),
        )
    }

    /// Model name recorded with every collection built under this config.
    pub fn embedding_model_name(&self) -> String {
        match self.embedding_provider {
            EmbeddingProvider::Ngram => format!("char-ngram-{DEFAULT_EMBEDDING_DIMENSIONS}"),
            EmbeddingProvider::Ollama => self.embedding_model.clone().unwrap_or_default(),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }
}

fn base_url(host: &str, port: u16) -> Result<Url, ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::Invalid("host must not be empty".to_string()));
    }
    Ok(Url::parse(&format!("http://{host}:{port}"))?)
}
