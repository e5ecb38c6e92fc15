use crate::config::{EmbeddingProvider, RagConfig};
use crate::llm::{LanguageModel, ServiceStatus};
use crate::state::IndexState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of the effective configuration and runtime state.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub index_path: String,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub local_docs_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub llm_model: String,
    pub llm_host: String,
    pub llm_port: u16,
    pub prompt_template: String,
    pub top_k: usize,
    pub index_loaded: bool,
    pub live_collection: Option<String>,
    pub build_in_progress: bool,
    pub llm_status: ServiceStatus,
    pub collected_at: DateTime<Utc>,
}

impl Diagnostics {
    pub async fn collect(config: &RagConfig, state: &IndexState, llm: &dyn LanguageModel) -> Self {
        let live_collection = state.live().map(|index| index.collection().to_string());
        let llm_status = llm.probe().await;

        Self {
            index_path: config.index_path.display().to_string(),
            embedding_provider: config.embedding_provider,
            embedding_model: config.embedding_model_name(),
            local_docs_path: config.docs_path.display().to_string(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            llm_model: config.llm_model.clone(),
            llm_host: config.llm_host.clone(),
            llm_port: config.llm_port,
            prompt_template: config.prompt_template.clone(),
            top_k: config.top_k,
            index_loaded: live_collection.is_some(),
            live_collection,
            build_in_progress: state.is_building(),
            llm_status,
            collected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingModel;

    #[tokio::test]
    async fn reports_config_and_state() -> Result<(), Box<dyn std::error::Error>> {
        let config = RagConfig::default();
        let report =
            Diagnostics::collect(&config, &IndexState::empty(), &RecordingModel::default()).await;

        assert_eq!(report.llm_model, "llama3.2:1b");
        assert_eq!(report.llm_port, 11434);
        assert_eq!(report.chunk_size, 1000);
        assert_eq!(report.top_k, 4);
        assert!(!report.index_loaded);
        assert!(!report.build_in_progress);
        assert!(matches!(report.llm_status, ServiceStatus::Reachable { status_code: 200, .. }));

        let json = serde_json::to_value(&report)?;
        assert_eq!(json["embedding_provider"], "ngram");
        assert_eq!(json["llm_status"]["state"], "reachable");
        Ok(())
    }
}
