use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A bounded piece of page text together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// File name of the originating document.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Unique within one indexing run, strictly increasing.
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Identifies how the vectors of a collection were produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingScheme {
    pub model: String,
    pub dimensions: Option<usize>,
}

impl EmbeddingScheme {
    pub fn new(model: impl Into<String>, dimensions: Option<usize>) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }

    /// Same model, and no conflicting dimension once both sides know theirs.
    pub fn is_compatible_with(&self, other: &EmbeddingScheme) -> bool {
        if self.model != other.model {
            return false;
        }
        match (self.dimensions, other.dimensions) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
    }
}

impl fmt::Display for EmbeddingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimensions {
            Some(dimensions) => write!(f, "{} ({dimensions} dims)", self.model),
            None => write!(f, "{}", self.model),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
    #[serde(default)]
    pub session_context: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_session_context(mut self, session_context: impl Into<String>) -> Self {
        self.session_context = Some(session_context.into());
        self
    }

    pub fn with_prompt_template(mut self, prompt_template: impl Into<String>) -> Self {
        self.prompt_template = Some(prompt_template.into());
        self
    }

    /// Session context if present and non-empty, else `""`.
    pub fn session_context(&self) -> &str {
        self.session_context.as_deref().unwrap_or_default()
    }

    /// The text used for both retrieval and generation.
    pub fn effective_query(&self) -> String {
        let session_context = self.session_context();
        if session_context.is_empty() {
            self.prompt.clone()
        } else {
            format!("{session_context}\n{}", self.prompt)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub page: u32,
    pub id: u64,
}

impl From<&Chunk> for SourceRef {
    fn from(chunk: &Chunk) -> Self {
        Self {
            source: chunk.source.clone(),
            page: chunk.page,
            id: chunk.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub response: String,
    pub session_context: String,
    pub grounded: bool,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexingReport {
    pub chunk_count: u64,
    pub files_indexed: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub failed_writes: Vec<SkippedFile>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IndexingReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub collection: String,
    pub report: IndexingReport,
}
