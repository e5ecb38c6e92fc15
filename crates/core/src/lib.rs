pub mod chunking;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod query;
pub mod service;
pub mod state;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{ChunkingConfig, TextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{EmbeddingProvider, RagConfig};
pub use coordinator::{BuildCoordinator, BuildHandle, BuildRequest};
pub use diagnostics::Diagnostics;
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    BuildError, ConfigError, EmbeddingError, IndexError, IngestError, LlmError, QueryError,
    ServiceError,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{VectorIndex, DEFAULT_COLLECTION};
pub use ingest::{chunk_document, discover_pdf_files, Indexer};
pub use llm::{LanguageModel, OllamaClient, ServiceStatus};
pub use models::{
    BuildReport, Chunk, EmbeddingScheme, IndexingReport, QueryAnswer, QueryRequest, ScoredChunk,
    SkippedFile, SourceRef,
};
pub use query::{PromptTemplate, QueryEngine, DEFAULT_INSTRUCTIONS, DEFAULT_TOP_K};
pub use service::RagService;
pub use state::IndexState;
pub use stores::LocalStore;
pub use traits::VectorStore;
