use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::llm::{LanguageModel, ServiceStatus};
use crate::{EmbeddingError, LlmError};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::Mutex;

/// Writes a minimal PDF with one text line per page.
pub fn write_pdf(path: &Path, pages: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let pages = pages.iter().copied().map(Some).collect::<Vec<_>>();
    build_pdf(path, &pages)
}

/// Like [`write_pdf`], but the content stream of page `broken` (1-based)
/// sets a font without naming it, so its text can't be extracted.
pub fn write_pdf_with_broken_page(
    path: &Path,
    pages: &[&str],
    broken: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let pages = pages
        .iter()
        .enumerate()
        .map(|(index, text)| (index + 1 != broken).then_some(*text))
        .collect::<Vec<_>>();
    build_pdf(path, &pages)
}

fn build_pdf(path: &Path, pages: &[Option<&str>]) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let operations = match page {
            Some(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            None => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![]),
                Operation::new("Tj", vec![Object::string_literal("lost")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content = Content { operations };
        let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document.save(path)?;
    Ok(())
}

/// Embedder whose backend is always down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::BackendResponse {
            backend: "test".to_string(),
            details: "embedding service down".to_string(),
        })
    }
}

/// Local n-gram embeddings, except that any batch containing `poison` fails.
pub struct SelectiveEmbedder {
    inner: CharacterNgramEmbedder,
    poison: String,
}

impl SelectiveEmbedder {
    pub fn failing_on(poison: impl Into<String>) -> Self {
        Self {
            inner: CharacterNgramEmbedder::default(),
            poison: poison.into(),
        }
    }
}

#[async_trait]
impl Embedder for SelectiveEmbedder {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner.dimensions()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|text| text.contains(&self.poison)) {
            return Err(EmbeddingError::BackendResponse {
                backend: "test".to_string(),
                details: format!("cannot embed text containing {:?}", self.poison),
            });
        }
        self.inner.embed(texts).await
    }
}

/// Language model that records every prompt and answers with a fixed text.
#[derive(Default)]
pub struct RecordingModel {
    response: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    pub fn answering(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(LlmError::BackendResponse {
                backend: "test".to_string(),
                details: "model unavailable".to_string(),
            });
        }
        Ok(self.response.clone())
    }

    async fn probe(&self) -> ServiceStatus {
        ServiceStatus::Reachable {
            status_code: 200,
            models: serde_json::json!({ "models": [] }),
        }
    }
}
