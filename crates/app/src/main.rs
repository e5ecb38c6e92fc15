mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use localdocs_rag_core::{
    BuildRequest, ChunkingConfig, EmbeddingProvider, QueryRequest, RagConfig, RagService,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_INSTRUCTIONS, DEFAULT_TOP_K,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "localdocs-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding the persisted vector index
    #[arg(long, global = true, env = "INDEX_PATH", default_value = "./index/")]
    index_path: PathBuf,

    /// Embedding backend: ngram (in-process) or ollama
    #[arg(long, global = true, env = "EMBEDDING_PROVIDER", default_value = "ngram")]
    embedding_provider: EmbeddingProvider,

    /// Embedding model served by Ollama
    #[arg(long, global = true, env = "EMBEDDING_MODEL_NAME")]
    embedding_model: Option<String>,

    /// Embedding server host (defaults to the LLM host)
    #[arg(long, global = true, env = "EMBEDDING_HOST")]
    embedding_host: Option<String>,

    /// Embedding server port (defaults to the LLM port)
    #[arg(long, global = true, env = "EMBEDDING_PORT")]
    embedding_port: Option<u16>,

    /// Folder whose PDF files are indexed
    #[arg(long, global = true, env = "LOCAL_DOCS_PATH", default_value = "./localdocs/")]
    docs_path: PathBuf,

    /// Maximum chunk length in characters
    #[arg(long, global = true, env = "SPLITTER_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(
        long,
        global = true,
        env = "SPLITTER_CHUNK_OVERLAP",
        default_value_t = DEFAULT_CHUNK_OVERLAP
    )]
    chunk_overlap: usize,

    /// Language model name
    #[arg(long, global = true, env = "LLM_MODEL", default_value = "llama3.2:1b")]
    llm_model: String,

    #[arg(long, global = true, env = "LLM_HOST", default_value = "ollama")]
    llm_host: String,

    #[arg(long, global = true, env = "LLM_PORT", default_value_t = 11434)]
    llm_port: u16,

    /// Instructions placed before the question and retrieved context
    #[arg(
        long,
        global = true,
        env = "RAG_PROMPT_TEMPLATE_TXT",
        default_value = DEFAULT_INSTRUCTIONS
    )]
    prompt_template: String,

    /// Number of chunks retrieved per query
    #[arg(long, global = true, env = "RETRIEVAL_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    #[arg(long, global = true, env = "LLM_TIMEOUT_SECS", default_value_t = 120)]
    llm_timeout_secs: u64,

    #[arg(long, global = true, env = "EMBEDDING_TIMEOUT_SECS", default_value_t = 30)]
    embedding_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve {
        /// Address to listen on (host:port).
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,
    },
    /// Rebuild the index from the documents folder and exit.
    Index,
    /// Answer one question and print the answer as JSON.
    Query {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        session_context: Option<String>,
        /// Instructions replacing the configured prompt template.
        #[arg(long)]
        prompt_template: Option<String>,
    },
}

impl Cli {
    fn rag_config(&self) -> RagConfig {
        RagConfig {
            index_path: self.index_path.clone(),
            embedding_provider: self.embedding_provider,
            embedding_model: self.embedding_model.clone(),
            embedding_host: self.embedding_host.clone(),
            embedding_port: self.embedding_port,
            docs_path: self.docs_path.clone(),
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            },
            llm_model: self.llm_model.clone(),
            llm_host: self.llm_host.clone(),
            llm_port: self.llm_port,
            prompt_template: self.prompt_template.clone(),
            top_k: self.top_k,
            llm_timeout_secs: self.llm_timeout_secs,
            embedding_timeout_secs: self.embedding_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("failed to read .env");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "localdocs-rag boot"
    );

    let service = RagService::open(cli.rag_config())
        .await
        .context("failed to start the rag service")?;

    match cli.command.unwrap_or(Command::Serve {
        bind: "0.0.0.0:8000".to_string(),
    }) {
        Command::Serve { bind } => serve(service, &bind).await?,
        Command::Index => {
            let BuildRequest::Accepted(handle) = service.coordinator().request_build() else {
                anyhow::bail!("an index build is already running");
            };
            let built = handle.wait().await?;
            for skipped in &built.report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            println!("{}", serde_json::to_string_pretty(&built)?);
        }
        Command::Query {
            prompt,
            session_context,
            prompt_template,
        } => {
            let request = QueryRequest {
                prompt,
                session_context,
                prompt_template,
            };
            let answer = service.engine().answer(request).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
    }

    Ok(())
}

async fn serve(service: RagService, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, server::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
