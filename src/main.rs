use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

use ragline::batching::BatchLimits;
use ragline::config::{IngestConfig, PollConfig};
use ragline::embeddings::{JobClient, LocalEmbedder, RemoteEmbedder};
use ragline::pipeline::IngestPipeline;
use ragline::pipeline::retry::{Backoff, RetryPolicy};
use ragline::server::{AppState, router};
use ragline::stores::PgChunkStore;

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    about = "Embedding ingestion pipeline and vector retrieval service"
)]
struct Cli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "RAGLINE_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// API key for the remote embedding provider.
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: String,

    /// Base URL for the remote provider (sync embeddings and the job API).
    #[arg(
        long,
        env = "RAGLINE_PROVIDER_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    provider_base_url: String,

    /// Remote embedding model identifier.
    #[arg(
        long,
        env = "RAGLINE_MODEL",
        default_value = "text-embedding-3-small"
    )]
    model: String,

    /// Vector dimension shared by ingestion, queries, and the store column.
    #[arg(long, env = "RAGLINE_DIMENSION", default_value_t = 1536)]
    dimension: usize,

    /// Base URL for the local inference service.
    #[arg(
        long,
        env = "RAGLINE_LOCAL_BASE",
        default_value = "http://localhost:11434"
    )]
    local_base_url: String,

    /// Local embedding model identifier.
    #[arg(long, env = "RAGLINE_LOCAL_MODEL", default_value = "all-minilm")]
    local_model: String,

    /// Maximum characters per fragment.
    #[arg(long, env = "RAGLINE_CHUNK_CHARS", default_value_t = 500)]
    chunk_chars: usize,

    /// Maximum fragments per synchronous batch.
    #[arg(long, env = "RAGLINE_BATCH_ITEMS", default_value_t = 64)]
    batch_max_items: usize,

    /// Maximum summed characters per synchronous batch.
    #[arg(long, env = "RAGLINE_BATCH_CHARS", default_value_t = 16_000)]
    batch_max_chars: usize,

    /// Retries allowed after a failed attempt (batch or fragment).
    #[arg(long, env = "RAGLINE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base retry delay in milliseconds (fixed for sync, linear for local).
    #[arg(long, env = "RAGLINE_RETRY_DELAY_MS", default_value_t = 500)]
    retry_delay_ms: u64,

    /// Seconds between asynchronous job status polls.
    #[arg(long, env = "RAGLINE_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,

    /// Overall deadline in seconds for an asynchronous job to finish.
    #[arg(long, env = "RAGLINE_POLL_DEADLINE_SECS", default_value_t = 600)]
    poll_deadline_secs: u64,

    /// Seconds before provider HTTP requests time out.
    #[arg(long, env = "RAGLINE_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let http = Client::builder()
        .timeout(Duration::from_secs(cli.http_timeout_secs))
        .build()?;

    let config = IngestConfig {
        chunk_chars: cli.chunk_chars,
        batch: BatchLimits {
            max_items: cli.batch_max_items,
            max_total_chars: cli.batch_max_chars,
        },
        sync_retry: RetryPolicy::new(
            cli.max_retries,
            Backoff::Fixed(Duration::from_millis(cli.retry_delay_ms)),
        ),
        local_retry: RetryPolicy::new(
            cli.max_retries,
            Backoff::Linear(Duration::from_millis(cli.retry_delay_ms)),
        ),
        poll: PollConfig {
            interval: Duration::from_secs(cli.poll_interval_secs),
            deadline: Duration::from_secs(cli.poll_deadline_secs),
        },
    };

    let store = PgChunkStore::connect(&cli.database_url, cli.dimension).await?;

    let state = AppState {
        pipeline: IngestPipeline::new(&config),
        remote: Arc::new(RemoteEmbedder::new(
            http.clone(),
            &cli.provider_base_url,
            cli.api_key.clone(),
            cli.model.clone(),
            cli.dimension,
        )),
        local: Arc::new(LocalEmbedder::new(
            http.clone(),
            &cli.local_base_url,
            cli.local_model.clone(),
            cli.dimension,
        )),
        jobs: Arc::new(JobClient::new(
            http,
            &cli.provider_base_url,
            cli.api_key,
            cli.model,
            cli.dimension,
        )),
        store: Arc::new(store),
    };

    let addr: SocketAddr = cli.bind.parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("serving on http://{addr}");
    axum::serve(listener, router(state).into_make_service()).await?;

    Ok(())
}
