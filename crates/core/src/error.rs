use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collection {collection} was built with {stored}, not {requested}")]
    SchemeMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    #[error("collection {0} does not exist")]
    MissingCollection(String),

    #[error("corrupt collection {collection}: {details}")]
    Corrupt { collection: String, details: String },

    #[error("index write failed: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("indexing failed: {0}")]
    Indexing(#[from] IngestError),

    #[error("index build wrote none of {failed} file(s) into {collection}")]
    Incomplete { collection: String, failed: usize },

    #[error("could not promote {collection}: {source}")]
    Promotion {
        collection: String,
        #[source]
        source: IndexError,
    },

    #[error("index build task ended abnormally: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("embedding client: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("language model client: {0}")]
    Llm(#[from] LlmError),
}
