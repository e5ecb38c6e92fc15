use crate::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Best-effort reachability check, never an error.
    async fn probe(&self) -> ServiceStatus;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    Reachable { status_code: u16, models: Value },
    Unreachable { reason: String },
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: Url,
    model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: Url,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            model: model.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn try_probe(&self) -> Result<ServiceStatus, LlmError> {
        let root = self.client.get(self.base_url.clone()).send().await?;
        let status_code = root.status().as_u16();
        let models = self
            .client
            .get(self.base_url.join("/api/tags")?)
            .send()
            .await?
            .json::<Value>()
            .await?;
        Ok(ServiceStatus::Reachable {
            status_code,
            models,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "generating");
        let response = self
            .client
            .post(self.base_url.join("/api/generate")?)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }

    async fn probe(&self) -> ServiceStatus {
        match self.try_probe().await {
            Ok(status) => status,
            Err(error) => ServiceStatus::Unreachable {
                reason: error.to_string(),
            },
        }
    }
}
