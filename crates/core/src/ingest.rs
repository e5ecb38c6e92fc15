use crate::chunking::{ChunkingConfig, TextSplitter};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::VectorIndex;
use crate::models::{Chunk, IndexingReport, SkippedFile};
use crate::IngestError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

/// PDF files directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Extracts and splits one document. Ids are assigned from `first_id` on.
pub fn chunk_document(
    extractor: &dyn PdfExtractor,
    splitter: &TextSplitter,
    path: &Path,
    first_id: u64,
) -> Result<Vec<Chunk>, IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let mut chunks = Vec::new();
    let mut next_id = first_id;
    let mut page_count = 0usize;

    for page in extractor.extract_pages(path)? {
        page_count += 1;
        for content in splitter.split(&page.text) {
            if content.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk {
                content,
                source: source.clone(),
                page: page.number,
                id: next_id,
            });
            next_id += 1;
        }
    }

    info!(source = %source, pages = page_count, chunks = chunks.len(), "read document");
    Ok(chunks)
}

/// Rebuilds a vector index from the PDF files of a folder.
#[derive(Clone)]
pub struct Indexer {
    extractor: Arc<dyn PdfExtractor>,
    splitter: Arc<TextSplitter>,
}

impl Indexer {
    pub fn new(extractor: Arc<dyn PdfExtractor>, splitter: TextSplitter) -> Self {
        Self {
            extractor,
            splitter: Arc::new(splitter),
        }
    }

    pub fn with_lopdf(config: ChunkingConfig) -> Result<Self, IngestError> {
        Ok(Self::new(Arc::new(LopdfExtractor), TextSplitter::new(config)?))
    }

    /// Empties `index`, then adds every readable document of `folder` one
    /// file at a time. Unreadable files and failed writes are recorded in the
    /// report and the run moves on to the next file.
    pub async fn build(
        &self,
        folder: &Path,
        index: &VectorIndex,
    ) -> Result<IndexingReport, IngestError> {
        if !folder.is_dir() {
            return Err(IngestError::InvalidArgument(format!(
                "document folder {} is not a directory",
                folder.display()
            )));
        }

        let started_at = Utc::now();
        index.reset().await?;

        let files = discover_pdf_files(folder);
        info!(
            folder = %folder.display(),
            files = files.len(),
            collection = index.collection(),
            "indexing documents"
        );

        let mut next_id = 1u64;
        let mut chunk_count = 0u64;
        let mut files_indexed = 0usize;
        let mut skipped_files = Vec::new();
        let mut failed_writes = Vec::new();

        for path in files {
            let chunks = match self.chunk_file(path.clone(), next_id).await {
                Ok(chunks) => chunks,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable document");
                    skipped_files.push(SkippedFile {
                        path,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            let written = chunks.len() as u64;
            next_id += written;

            match index.add(&chunks).await {
                Ok(()) => {
                    chunk_count += written;
                    files_indexed += 1;
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to write document chunks");
                    failed_writes.push(SkippedFile {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        let report = IndexingReport {
            chunk_count,
            files_indexed,
            skipped_files,
            failed_writes,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            chunks = report.chunk_count,
            files = report.files_indexed,
            skipped = report.skipped_files.len(),
            failed = report.failed_writes.len(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "indexing finished"
        );
        Ok(report)
    }

    async fn chunk_file(&self, path: PathBuf, first_id: u64) -> Result<Vec<Chunk>, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let splitter = Arc::clone(&self.splitter);
        tokio::task::spawn_blocking(move || {
            chunk_document(extractor.as_ref(), &splitter, &path, first_id)
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))?
    }
}
