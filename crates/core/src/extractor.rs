use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// Pages of one document, extracted as the iterator is advanced.
pub type PageTexts = Box<dyn Iterator<Item = PageText> + Send>;

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<PageTexts, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<PageTexts, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let numbers = document.get_pages().into_keys().collect::<Vec<_>>();

        if numbers.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        Ok(Box::new(LopdfPages {
            document,
            numbers: numbers.into_iter(),
            source: path.display().to_string(),
        }))
    }
}

struct LopdfPages {
    document: Document,
    numbers: std::vec::IntoIter<u32>,
    source: String,
}

impl Iterator for LopdfPages {
    type Item = PageText;

    fn next(&mut self) -> Option<Self::Item> {
        let number = self.numbers.next()?;
        let text = match self.document.extract_text(&[number]) {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    source = %self.source,
                    page = number,
                    %error,
                    "unreadable page, using empty text"
                );
                String::new()
            }
        };
        Some(PageText { number, text })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.numbers.size_hint()
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    Ok(LopdfExtractor.extract_pages(path)?.collect())
}
