use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::traits::VectorStore;
use crate::IndexError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Process-wide index state shared by the build coordinator and the query
/// engine: the live index, if any, and whether a build is running.
#[derive(Debug, Default)]
pub struct IndexState {
    build_in_progress: AtomicBool,
    live: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_live(index: VectorIndex) -> Self {
        Self {
            build_in_progress: AtomicBool::new(false),
            live: RwLock::new(Some(Arc::new(index))),
        }
    }

    /// Loads whatever collection `alias` points at in `store`. A missing,
    /// unreadable or incompatible collection leaves the state empty.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        alias: &str,
    ) -> Result<Self, IndexError> {
        let Some(collection) = store.resolve_alias(alias).await? else {
            info!(alias, "no index built yet");
            return Ok(Self::empty());
        };

        let index = VectorIndex::new(store, embedder, collection);
        match index.is_usable().await {
            Ok(true) => {
                info!(collection = index.collection(), "loaded existing index");
                Ok(Self::with_live(index))
            }
            Ok(false) => {
                warn!(
                    collection = index.collection(),
                    scheme = %index.scheme(),
                    "existing index is missing or was built with another embedder, ignoring it"
                );
                Ok(Self::empty())
            }
            Err(error) => {
                warn!(
                    collection = index.collection(),
                    %error,
                    "existing index is unreadable, ignoring it"
                );
                Ok(Self::empty())
            }
        }
    }

    /// Snapshot of the live index. Readers keep their snapshot even if a
    /// build swaps in a new one meanwhile.
    pub fn live(&self) -> Option<Arc<VectorIndex>> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `index` as live and returns the one it replaced.
    pub fn replace_live(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        live.replace(Arc::new(index))
    }

    pub fn is_building(&self) -> bool {
        self.build_in_progress.load(Ordering::Acquire)
    }

    /// Claims the build flag. `None` when another build holds it.
    pub(crate) fn try_begin_build(self: &Arc<Self>) -> Option<BuildGuard> {
        self.build_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BuildGuard {
                state: Arc::clone(self),
            })
    }
}

/// Holds the build flag. Dropping it clears the flag however the build ends.
#[derive(Debug)]
pub(crate) struct BuildGuard {
    state: Arc<IndexState>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.state.build_in_progress.store(false, Ordering::Release);
    }
}
