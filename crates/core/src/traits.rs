use crate::models::{Chunk, EmbeddingScheme, ScoredChunk};
use crate::IndexError;
use async_trait::async_trait;

/// Storage engine for named vector collections.
///
/// Collections are addressed by their physical name. An alias maps a stable
/// logical name to whichever collection is currently live.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Creates the collection, or empties it if it exists.
    async fn reset_collection(
        &self,
        collection: &str,
        scheme: &EmbeddingScheme,
    ) -> Result<(), IndexError>;

    /// Persists all records or none of them.
    async fn insert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError>;

    /// Nearest neighbours of `query_vector`, most similar first. Unknown
    /// collections have no neighbours.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Scheme the collection was built with, `None` if it doesn't exist.
    async fn collection_scheme(
        &self,
        collection: &str,
    ) -> Result<Option<EmbeddingScheme>, IndexError>;

    async fn count(&self, collection: &str) -> Result<usize, IndexError>;

    async fn drop_collection(&self, collection: &str) -> Result<(), IndexError>;

    async fn list_collections(&self) -> Result<Vec<String>, IndexError>;

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, IndexError>;

    async fn set_alias(&self, alias: &str, collection: &str) -> Result<(), IndexError>;
}
