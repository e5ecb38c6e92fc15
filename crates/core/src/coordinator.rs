use crate::embeddings::Embedder;
use crate::index::{VectorIndex, DEFAULT_COLLECTION};
use crate::ingest::Indexer;
use crate::models::{BuildReport, IndexingReport};
use crate::state::IndexState;
use crate::traits::VectorStore;
use crate::{BuildError, IndexError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of asking for an index build.
#[derive(Debug)]
pub enum BuildRequest {
    Accepted(BuildHandle),
    /// Another build is still running; nothing was started.
    Rejected,
}

impl BuildRequest {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

#[derive(Debug)]
pub struct BuildHandle {
    task: JoinHandle<Result<BuildReport, BuildError>>,
}

impl BuildHandle {
    pub async fn wait(self) -> Result<BuildReport, BuildError> {
        self.task
            .await
            .map_err(|error| BuildError::Aborted(error.to_string()))?
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Runs index builds in the background, at most one at a time.
///
/// Every build writes a fresh collection named `<alias>-<uuid>`. Queries keep
/// using the previous live index until the new one is complete, at which
/// point the alias is moved and the old collection is dropped.
#[derive(Clone)]
pub struct BuildCoordinator {
    state: Arc<IndexState>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    indexer: Indexer,
    documents: PathBuf,
    alias: String,
}

impl BuildCoordinator {
    pub fn new(
        state: Arc<IndexState>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        indexer: Indexer,
        documents: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state,
            store,
            embedder,
            indexer,
            documents: documents.into(),
            alias: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn state(&self) -> &Arc<IndexState> {
        &self.state
    }

    pub fn documents(&self) -> &Path {
        &self.documents
    }

    /// Starts a build unless one is already running. Must be called from
    /// within a tokio runtime.
    pub fn request_build(&self) -> BuildRequest {
        let Some(guard) = self.state.try_begin_build() else {
            info!(folder = %self.documents.display(), "index build already running");
            return BuildRequest::Rejected;
        };

        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            coordinator.rebuild().await
        });
        BuildRequest::Accepted(BuildHandle { task })
    }

    async fn rebuild(&self) -> Result<BuildReport, BuildError> {
        self.prune_stale().await;

        let collection = format!("{}-{}", self.alias, Uuid::new_v4().simple());
        let shadow = VectorIndex::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            collection.clone(),
        );
        info!(folder = %self.documents.display(), collection = %collection, "index build started");

        let outcome = match self.indexer.build(&self.documents, &shadow).await {
            Ok(report) => self.promote(shadow, report).await,
            Err(error) => Err(error.into()),
        };

        match &outcome {
            Ok(built) => info!(
                collection = %built.collection,
                chunks = built.report.chunk_count,
                files = built.report.files_indexed,
                skipped = built.report.skipped_files.len(),
                "index build finished"
            ),
            Err(failure) => {
                error!(collection = %collection, error = %failure, "index build failed");
                self.discard(&collection).await;
            }
        }
        outcome
    }

    async fn promote(
        &self,
        shadow: VectorIndex,
        report: IndexingReport,
    ) -> Result<BuildReport, BuildError> {
        let collection = shadow.collection().to_string();

        if !report.failed_writes.is_empty() {
            if report.files_indexed == 0 {
                return Err(BuildError::Incomplete {
                    collection,
                    failed: report.failed_writes.len(),
                });
            }
            warn!(
                collection = %collection,
                failed = report.failed_writes.len(),
                written = report.files_indexed,
                "promoting index with partial coverage"
            );
        }

        match shadow.is_usable().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(BuildError::Promotion {
                    collection: collection.clone(),
                    source: IndexError::MissingCollection(collection),
                })
            }
            Err(source) => return Err(BuildError::Promotion { collection, source }),
        }

        if let Err(source) = self.store.set_alias(&self.alias, &collection).await {
            return Err(BuildError::Promotion { collection, source });
        }

        if let Some(previous) = self.state.replace_live(shadow) {
            if previous.collection() != collection {
                if let Err(error) = self.store.drop_collection(previous.collection()).await {
                    warn!(
                        collection = previous.collection(),
                        %error,
                        "failed to drop replaced index"
                    );
                }
            }
        }

        Ok(BuildReport { collection, report })
    }

    /// Drops collections left behind by builds that never finished.
    async fn prune_stale(&self) {
        let collections = match self.store.list_collections().await {
            Ok(collections) => collections,
            Err(error) => {
                warn!(%error, "could not list collections for cleanup");
                return;
            }
        };

        let live = self
            .state
            .live()
            .map(|index| index.collection().to_string());
        let aliased = self.store.resolve_alias(&self.alias).await.ok().flatten();
        let prefix = format!("{}-", self.alias);

        for collection in collections {
            let keep = !collection.starts_with(&prefix)
                || live.as_deref() == Some(collection.as_str())
                || aliased.as_deref() == Some(collection.as_str());
            if keep {
                continue;
            }
            info!(collection = %collection, "dropping incomplete index");
            self.discard(&collection).await;
        }
    }

    async fn discard(&self, collection: &str) {
        if let Err(error) = self.store.drop_collection(collection).await {
            warn!(collection, %error, "failed to drop collection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingConfig;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::Chunk;
    use crate::stores::LocalStore;
    use crate::test_support::{write_pdf, FailingEmbedder, SelectiveEmbedder};
    use tempfile::tempdir;

    fn coordinator(
        state: Arc<IndexState>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        documents: &Path,
    ) -> BuildCoordinator {
        let indexer = Indexer::with_lopdf(ChunkingConfig::default()).expect("default config");
        BuildCoordinator::new(state, store, embedder, indexer, documents)
    }

    fn live_collection(state: &IndexState) -> Option<String> {
        state.live().map(|index| index.collection().to_string())
    }

    #[tokio::test]
    async fn second_request_is_rejected_while_building() -> Result<(), Box<dyn std::error::Error>> {
        let docs = tempdir()?;
        let store_dir = tempdir()?;
        write_pdf(&docs.path().join("sky.pdf"), &["The sky is blue."])?;

        let state = Arc::new(IndexState::empty());
        let builds = coordinator(
            Arc::clone(&state),
            Arc::new(LocalStore::new(store_dir.path())),
            Arc::new(CharacterNgramEmbedder::default()),
            docs.path(),
        );

        let BuildRequest::Accepted(handle) = builds.request_build() else {
            return Err("first build should be accepted".into());
        };
        assert!(state.is_building());
        assert!(!builds.request_build().is_accepted());

        let built = handle.wait().await?;
        assert_eq!(built.report.chunk_count, 1);
        assert!(!state.is_building());
        assert_eq!(live_collection(&state), Some(built.collection));

        let BuildRequest::Accepted(again) = builds.request_build() else {
            return Err("build after completion should be accepted".into());
        };
        again.wait().await?;
        Ok(())
    }

    #[tokio::test]
    async fn live_index_is_swapped_only_when_complete() -> Result<(), Box<dyn std::error::Error>> {
        let docs = tempdir()?;
        let store_dir = tempdir()?;
        write_pdf(&docs.path().join("sky.pdf"), &["The sky is blue."])?;

        let store: Arc<dyn VectorStore> = Arc::new(LocalStore::new(store_dir.path()));
        let state = Arc::new(IndexState::empty());
        let builds = coordinator(
            Arc::clone(&state),
            Arc::clone(&store),
            Arc::new(CharacterNgramEmbedder::default()),
            docs.path(),
        );

        let BuildRequest::Accepted(first) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        let first = first.wait().await?;
        assert!(first.collection.starts_with("local_collection-"));

        write_pdf(&docs.path().join("grass.pdf"), &["Grass is green."])?;
        let BuildRequest::Accepted(second) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        assert_eq!(live_collection(&state), Some(first.collection.clone()));

        let second = second.wait().await?;
        assert_ne!(second.collection, first.collection);
        assert_eq!(second.report.chunk_count, 2);
        assert_eq!(live_collection(&state), Some(second.collection.clone()));
        assert_eq!(
            store.resolve_alias(DEFAULT_COLLECTION).await?,
            Some(second.collection.clone())
        );
        assert_eq!(store.list_collections().await?, vec![second.collection]);

        let live = state.live().ok_or("live index expected")?;
        let hits = live.search("Grass is green.", 1).await?;
        assert_eq!(hits[0].chunk.source, "grass.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn failed_build_keeps_previous_index() -> Result<(), Box<dyn std::error::Error>> {
        let docs = tempdir()?;
        let store_dir = tempdir()?;
        write_pdf(&docs.path().join("sky.pdf"), &["The sky is blue."])?;

        let store: Arc<dyn VectorStore> = Arc::new(LocalStore::new(store_dir.path()));
        let previous = VectorIndex::new(
            Arc::clone(&store),
            Arc::new(CharacterNgramEmbedder::default()),
            "local_collection-previous",
        );
        previous.reset().await?;
        previous
            .add(&[Chunk {
                content: "Earlier content.".to_string(),
                source: "old.pdf".to_string(),
                page: 1,
                id: 1,
            }])
            .await?;
        let state = Arc::new(IndexState::with_live(previous));

        let builds = coordinator(
            Arc::clone(&state),
            Arc::clone(&store),
            Arc::new(FailingEmbedder),
            docs.path(),
        );
        let BuildRequest::Accepted(handle) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        let result = handle.wait().await;

        assert!(matches!(result, Err(BuildError::Incomplete { failed: 1, .. })));
        assert!(!state.is_building());
        assert_eq!(
            live_collection(&state),
            Some("local_collection-previous".to_string())
        );
        assert_eq!(
            store.list_collections().await?,
            vec!["local_collection-previous".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn partially_written_build_is_promoted() -> Result<(), Box<dyn std::error::Error>> {
        let docs = tempdir()?;
        let store_dir = tempdir()?;
        write_pdf(&docs.path().join("a.pdf"), &["The sky is blue."])?;
        write_pdf(&docs.path().join("b.pdf"), &["An unembeddable page."])?;

        let state = Arc::new(IndexState::empty());
        let builds = coordinator(
            Arc::clone(&state),
            Arc::new(LocalStore::new(store_dir.path())),
            Arc::new(SelectiveEmbedder::failing_on("unembeddable")),
            docs.path(),
        );
        let BuildRequest::Accepted(handle) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        let built = handle.wait().await?;

        assert_eq!(built.report.files_indexed, 1);
        assert_eq!(built.report.failed_writes.len(), 1);
        assert_eq!(live_collection(&state), Some(built.collection));

        let live = state.live().ok_or("live index expected")?;
        let hits = live.search("The sky is blue.", 4).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source, "a.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn missing_folder_fails_and_clears_flag() -> Result<(), Box<dyn std::error::Error>> {
        let store_dir = tempdir()?;
        let state = Arc::new(IndexState::empty());
        let builds = coordinator(
            Arc::clone(&state),
            Arc::new(LocalStore::new(store_dir.path())),
            Arc::new(CharacterNgramEmbedder::default()),
            Path::new("/definitely/not/a/folder"),
        );

        let BuildRequest::Accepted(handle) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        assert!(matches!(handle.wait().await, Err(BuildError::Indexing(_))));
        assert!(!state.is_building());
        assert!(state.live().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_build_clears_flag() -> Result<(), Box<dyn std::error::Error>> {
        let docs = tempdir()?;
        let store_dir = tempdir()?;
        let state = Arc::new(IndexState::empty());
        let builds = coordinator(
            Arc::clone(&state),
            Arc::new(LocalStore::new(store_dir.path())),
            Arc::new(CharacterNgramEmbedder::default()),
            docs.path(),
        );

        let BuildRequest::Accepted(handle) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        handle.cancel();
        assert!(matches!(handle.wait().await, Err(BuildError::Aborted(_))));
        assert!(!state.is_building());
        assert!(builds.request_build().is_accepted());
        Ok(())
    }

    #[tokio::test]
    async fn stale_collections_are_pruned() -> Result<(), Box<dyn std::error::Error>> {
        let docs = tempdir()?;
        let store_dir = tempdir()?;
        write_pdf(&docs.path().join("sky.pdf"), &["The sky is blue."])?;

        let store: Arc<dyn VectorStore> = Arc::new(LocalStore::new(store_dir.path()));
        let embedder: Arc<dyn Embedder> = Arc::new(CharacterNgramEmbedder::default());
        for name in ["local_collection-stale", "unrelated"] {
            VectorIndex::new(Arc::clone(&store), Arc::clone(&embedder), name)
                .reset()
                .await?;
        }

        let state = Arc::new(IndexState::empty());
        let builds = coordinator(state, Arc::clone(&store), embedder, docs.path());
        let BuildRequest::Accepted(handle) = builds.request_build() else {
            return Err("build should be accepted".into());
        };
        let built = handle.wait().await?;

        let mut expected = vec![built.collection, "unrelated".to_string()];
        expected.sort_unstable();
        assert_eq!(store.list_collections().await?, expected);
        Ok(())
    }
}
