use crate::models::{Chunk, EmbeddingScheme, ScoredChunk};
use crate::traits::VectorStore;
use crate::IndexError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

const FORMAT_VERSION: u32 = 1;
const COLLECTIONS_DIR: &str = "collections";
const META_FILE: &str = "collection.json";
const BATCH_PREFIX: &str = "batch-";
const ALIAS_SUFFIX: &str = "current";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    version: u32,
    name: String,
    scheme: EmbeddingScheme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory view of a collection directory.
#[derive(Debug, Clone)]
struct Collection {
    scheme: EmbeddingScheme,
    records: Vec<StoredRecord>,
    next_batch: u64,
}

/// File-backed vector store searched by brute-force cosine similarity.
///
/// Each collection is a directory holding `collection.json` (name and
/// embedding scheme) plus one `batch-NNNNNNNN.json` per insert. Every file is
/// written once, atomically, so an insert costs only its own records.
pub struct LocalStore {
    root: PathBuf,
    min_similarity: f32,
    cache: RwLock<HashMap<String, Arc<Collection>>>,
    writer: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            min_similarity: 0.0,
            cache: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Hits scoring at or below this similarity are not returned.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, IndexError> {
        validate_name(collection)?;
        Ok(self.root.join(COLLECTIONS_DIR).join(collection))
    }

    fn alias_path(&self, alias: &str) -> Result<PathBuf, IndexError> {
        validate_name(alias)?;
        Ok(self.root.join(format!("{alias}.{ALIAS_SUFFIX}")))
    }

    async fn load(&self, collection: &str) -> Result<Option<Arc<Collection>>, IndexError> {
        if let Some(found) = self.cache.read().await.get(collection) {
            return Ok(Some(Arc::clone(found)));
        }

        let dir = self.collection_dir(collection)?;
        let Some(loaded) = read_collection(&dir, collection).await? else {
            return Ok(None);
        };
        Ok(Some(self.remember(collection, &dir, loaded).await))
    }

    /// Caches a collection read from disk. A copy cached meanwhile by a
    /// writer wins, and nothing is cached once the directory is gone, so a
    /// read racing `drop_collection` cannot bring the collection back.
    async fn remember(&self, collection: &str, dir: &Path, loaded: Collection) -> Arc<Collection> {
        let mut cache = self.cache.write().await;
        if let Some(current) = cache.get(collection) {
            return Arc::clone(current);
        }

        let loaded = Arc::new(loaded);
        if fs::try_exists(dir.join(META_FILE)).await.unwrap_or(false) {
            cache.insert(collection.to_string(), Arc::clone(&loaded));
        }
        loaded
    }
}

async fn read_collection(dir: &Path, collection: &str) -> Result<Option<Collection>, IndexError> {
    let Some(bytes) = read_if_present(&dir.join(META_FILE)).await? else {
        return Ok(None);
    };
    let meta: CollectionMeta = decode(collection, &bytes)?;
    if meta.version != FORMAT_VERSION {
        return Err(IndexError::Corrupt {
            collection: collection.to_string(),
            details: format!("unsupported format version {}", meta.version),
        });
    }

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let mut batches = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(index) = batch_index(&entry.file_name()) {
            batches.push((index, entry.path()));
        }
    }
    batches.sort_unstable_by_key(|(index, _)| *index);

    let next_batch = batches.last().map_or(1, |(index, _)| index + 1);
    let mut records = Vec::new();
    for (_, path) in batches {
        let Some(bytes) = read_if_present(&path).await? else {
            return Ok(None);
        };
        records.extend(decode::<Vec<StoredRecord>>(collection, &bytes)?);
    }

    Ok(Some(Collection {
        scheme: meta.scheme,
        records,
        next_batch,
    }))
}

async fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>, IndexError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn decode<T: DeserializeOwned>(collection: &str, bytes: &[u8]) -> Result<T, IndexError> {
    serde_json::from_slice(bytes).map_err(|error| IndexError::Corrupt {
        collection: collection.to_string(),
        details: error.to_string(),
    })
}

fn batch_file(index: u64) -> String {
    format!("{BATCH_PREFIX}{index:08}.json")
}

fn batch_index(file_name: &OsStr) -> Option<u64> {
    file_name
        .to_str()?
        .strip_prefix(BATCH_PREFIX)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

async fn write_meta(
    dir: &Path,
    collection: &str,
    scheme: &EmbeddingScheme,
) -> Result<(), IndexError> {
    let meta = CollectionMeta {
        version: FORMAT_VERSION,
        name: collection.to_string(),
        scheme: scheme.clone(),
    };
    write_atomically(&dir.join(META_FILE), &serde_json::to_vec(&meta)?).await
}

async fn remove_dir_if_present(dir: &Path) -> Result<(), IndexError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn reset_collection(
        &self,
        collection: &str,
        scheme: &EmbeddingScheme,
    ) -> Result<(), IndexError> {
        let dir = self.collection_dir(collection)?;
        let _guard = self.writer.lock().await;
        remove_dir_if_present(&dir).await?;
        write_meta(&dir, collection, scheme).await?;
        self.cache.write().await.insert(
            collection.to_string(),
            Arc::new(Collection {
                scheme: scheme.clone(),
                records: Vec::new(),
                next_batch: 1,
            }),
        );
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Write(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dir = self.collection_dir(collection)?;
        let _guard = self.writer.lock().await;
        let mut current = self
            .load(collection)
            .await?
            .ok_or_else(|| IndexError::MissingCollection(collection.to_string()))?;

        let mut scheme = current.scheme.clone();
        for embedding in embeddings {
            match scheme.dimensions {
                Some(expected) if expected != embedding.len() => {
                    return Err(IndexError::SchemeMismatch {
                        collection: collection.to_string(),
                        stored: scheme.to_string(),
                        requested: format!("{} ({} dims)", scheme.model, embedding.len()),
                    });
                }
                Some(_) => {}
                None => scheme.dimensions = Some(embedding.len()),
            }
        }

        let batch = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| StoredRecord {
                chunk: chunk.clone(),
                vector: vector.clone(),
            })
            .collect::<Vec<_>>();

        if scheme != current.scheme {
            write_meta(&dir, collection, &scheme).await?;
        }
        let index = current.next_batch;
        write_atomically(&dir.join(batch_file(index)), &serde_json::to_vec(&batch)?).await?;

        let mut cache = self.cache.write().await;
        cache.remove(collection);
        let updated = Arc::make_mut(&mut current);
        updated.scheme = scheme;
        updated.records.extend(batch);
        updated.next_batch = index + 1;
        cache.insert(collection.to_string(), current);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let Some(file) = self.load(collection).await? else {
            return Ok(Vec::new());
        };

        if let Some(expected) = file.scheme.dimensions {
            if expected != query_vector.len() {
                return Err(IndexError::SchemeMismatch {
                    collection: collection.to_string(),
                    stored: file.scheme.to_string(),
                    requested: format!("{} dims", query_vector.len()),
                });
            }
        }

        let mut hits = file
            .records
            .iter()
            .map(|record| (cosine_similarity(query_vector, &record.vector), record))
            .filter(|(score, _)| *score > self.min_similarity)
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| {
            right
                .0
                .total_cmp(&left.0)
                .then_with(|| left.1.chunk.id.cmp(&right.1.chunk.id))
        });

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(score, record)| ScoredChunk {
                chunk: record.chunk.clone(),
                score,
            })
            .collect())
    }

    async fn collection_scheme(
        &self,
        collection: &str,
    ) -> Result<Option<EmbeddingScheme>, IndexError> {
        Ok(self
            .load(collection)
            .await?
            .map(|file| file.scheme.clone()))
    }

    async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        Ok(self
            .load(collection)
            .await?
            .map_or(0, |file| file.records.len()))
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), IndexError> {
        let dir = self.collection_dir(collection)?;
        let _guard = self.writer.lock().await;
        // Files go first: `remember` refuses to cache a collection whose
        // directory is gone.
        remove_dir_if_present(&dir).await?;
        self.cache.write().await.remove(collection);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let mut entries = match fs::read_dir(self.root.join(COLLECTIONS_DIR)).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort_unstable();
        Ok(names)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, IndexError> {
        let path = self.alias_path(alias)?;
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let target = content.trim();
                Ok((!target.is_empty()).then(|| target.to_string()))
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn set_alias(&self, alias: &str, collection: &str) -> Result<(), IndexError> {
        validate_name(collection)?;
        let path = self.alias_path(alias)?;
        let _guard = self.writer.lock().await;
        write_atomically(&path, collection.as_bytes()).await
    }
}

fn validate_name(name: &str) -> Result<(), IndexError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(IndexError::Write(format!("invalid collection name: {name:?}")))
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    fs::write(&staging, bytes).await?;
    fs::rename(&staging, path).await?;
    Ok(())
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}
