use crate::embeddings::Embedder;
use crate::models::{Chunk, EmbeddingScheme, ScoredChunk};
use crate::traits::VectorStore;
use crate::IndexError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_COLLECTION: &str = "local_collection";

const EMBED_BATCH_SIZE: usize = 64;

/// A queryable collection: a store, the collection name and the embedder
/// that produced (and must keep producing) its vectors.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("backend", &self.store.backend())
            .field("collection", &self.collection)
            .field("embedder", &self.embedder.model())
            .finish()
    }
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn scheme(&self) -> EmbeddingScheme {
        self.embedder.scheme()
    }

    pub async fn reset(&self) -> Result<(), IndexError> {
        self.store
            .reset_collection(&self.collection, &self.scheme())
            .await
    }

    /// Embeds and stores the batch. Nothing becomes visible if any chunk
    /// fails to embed or the store rejects the write.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts = batch
                .iter()
                .map(|chunk| chunk.content.clone())
                .collect::<Vec<_>>();
            embeddings.extend(self.embedder.embed(&texts).await?);
        }

        self.store
            .insert(&self.collection, chunks, &embeddings)
            .await
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let Some(stored) = self.store.collection_scheme(&self.collection).await? else {
            return Ok(Vec::new());
        };
        let requested = self.scheme();
        if !stored.is_compatible_with(&requested) {
            return Err(IndexError::SchemeMismatch {
                collection: self.collection.clone(),
                stored: stored.to_string(),
                requested: requested.to_string(),
            });
        }

        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_vector) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let hits = self
            .store
            .search(&self.collection, &query_vector, k)
            .await?;
        debug!(collection = %self.collection, hits = hits.len(), k, "vector search");
        Ok(hits)
    }

    pub async fn len(&self) -> Result<usize, IndexError> {
        self.store.count(&self.collection).await
    }

    /// True when the collection exists and was built with this embedder.
    pub async fn is_usable(&self) -> Result<bool, IndexError> {
        Ok(self
            .store
            .collection_scheme(&self.collection)
            .await?
            .is_some_and(|stored| stored.is_compatible_with(&self.scheme())))
    }
}
