use crate::config::{EmbeddingProvider, RagConfig};
use crate::coordinator::BuildCoordinator;
use crate::diagnostics::Diagnostics;
use crate::embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder};
use crate::index::DEFAULT_COLLECTION;
use crate::ingest::Indexer;
use crate::llm::{LanguageModel, OllamaClient};
use crate::query::{PromptTemplate, QueryEngine};
use crate::state::IndexState;
use crate::stores::LocalStore;
use crate::traits::VectorStore;
use crate::ServiceError;
use std::sync::Arc;
use tracing::info;

/// The wired-up pipeline: shared index state, build coordinator and query
/// engine over one local store.
#[derive(Clone)]
pub struct RagService {
    config: Arc<RagConfig>,
    state: Arc<IndexState>,
    coordinator: BuildCoordinator,
    engine: QueryEngine,
}

impl RagService {
    /// Connects to the configured Ollama services and loads the persisted
    /// index, if there is one.
    pub async fn open(config: RagConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let embedder = embedder_for(&config)?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(
            config.llm_base_url()?,
            config.llm_model.clone(),
            config.llm_timeout(),
        )?);
        Self::with_components(config, embedder, llm).await
    }

    pub async fn with_components(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let store: Arc<dyn VectorStore> = Arc::new(LocalStore::new(config.store_root()));
        let state = Arc::new(
            IndexState::open(Arc::clone(&store), Arc::clone(&embedder), DEFAULT_COLLECTION).await?,
        );
        let indexer = Indexer::with_lopdf(config.chunking)?;
        let coordinator = BuildCoordinator::new(
            Arc::clone(&state),
            store,
            embedder,
            indexer,
            config.docs_path.clone(),
        );
        let engine = QueryEngine::new(Arc::clone(&state), llm)
            .with_default_template(PromptTemplate::from_instructions(
                config.prompt_template.clone(),
            ))
            .with_top_k(config.top_k);

        info!(
            store = %config.store_root().display(),
            docs = %config.docs_path.display(),
            embedding_model = %config.embedding_model_name(),
            llm_model = %config.llm_model,
            index_loaded = state.live().is_some(),
            "rag service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            state,
            coordinator,
            engine,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<IndexState> {
        &self.state
    }

    pub fn coordinator(&self) -> &BuildCoordinator {
        &self.coordinator
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        Diagnostics::collect(&self.config, &self.state, self.engine.llm().as_ref()).await
    }
}

fn embedder_for(config: &RagConfig) -> Result<Arc<dyn Embedder>, ServiceError> {
    let embedder: Arc<dyn Embedder> = match config.embedding_provider {
        EmbeddingProvider::Ngram => Arc::new(CharacterNgramEmbedder::default()),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            &config.embedding_base_url()?,
            config.embedding_model_name(),
            config.embedding_timeout(),
        )?),
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::BuildRequest;
    use crate::models::QueryRequest;
    use crate::test_support::{write_pdf, RecordingModel};
    use tempfile::tempdir;

    fn config_in(index: &std::path::Path, docs: &std::path::Path) -> RagConfig {
        RagConfig {
            index_path: index.to_path_buf(),
            docs_path: docs.to_path_buf(),
            ..RagConfig::default()
        }
    }

    async fn service(config: RagConfig) -> Result<RagService, ServiceError> {
        RagService::with_components(
            config,
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(RecordingModel::answering("Blue.")),
        )
        .await
    }

    #[tokio::test]
    async fn built_index_survives_a_restart() -> Result<(), Box<dyn std::error::Error>> {
        let index_dir = tempdir()?;
        let docs = tempdir()?;
        write_pdf(&docs.path().join("sky.pdf"), &["The sky is blue."])?;

        let first = service(config_in(index_dir.path(), docs.path())).await?;
        assert!(first.state().live().is_none());
        let BuildRequest::Accepted(handle) = first.coordinator().request_build() else {
            return Err("build should be accepted".into());
        };
        let built = handle.wait().await?;

        let restarted = service(config_in(index_dir.path(), docs.path())).await?;
        let live = restarted.state().live().ok_or("index should be reloaded")?;
        assert_eq!(live.collection(), built.collection);
        assert!(index_dir.path().join("embeddings_db").is_dir());

        let answer = restarted
            .engine()
            .answer(QueryRequest::new("What color is the sky?"))
            .await?;
        assert!(answer.grounded);
        assert_eq!(answer.response, "Blue.");
        Ok(())
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let config = RagConfig {
            top_k: 0,
            ..RagConfig::default()
        };
        assert!(matches!(service(config).await, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn diagnostics_reflect_the_loaded_index() -> Result<(), Box<dyn std::error::Error>> {
        let index_dir = tempdir()?;
        let docs = tempdir()?;
        let rag = service(config_in(index_dir.path(), docs.path())).await?;

        assert!(!rag.diagnostics().await.index_loaded);
        let BuildRequest::Accepted(handle) = rag.coordinator().request_build() else {
            return Err("build should be accepted".into());
        };
        handle.wait().await?;

        let report = rag.diagnostics().await;
        assert!(report.index_loaded);
        assert!(!report.build_in_progress);
        Ok(())
    }
}
