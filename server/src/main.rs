use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use sea_orm::{ConnectOptions, Database};
use server::orchestrator::{ExecutionOrchestrator, PooledMailFetcher};
use server::pipeline::AnalysisPipeline;
use server::pool::ImapConnectionPool;
use server::progress::BroadcastProgressSink;
use server::rate_limiters::LlmRateLimiter;
use server::repository::{Repository, SeaOrmRepository};
use server::routes::{AppRouter, AppState};
use server::scheduler::Scheduler;
use server::{embedding::UnavailableEmbeddingClassifier, llm::HttpLlmClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_env("RUST_LOG"))
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    tracing::info!("starting with config: {}", *server::server_config::cfg);

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);
    let conn = Database::connect(db_options).await.expect("database connection failed");

    let repository: Arc<dyn Repository> = Arc::new(SeaOrmRepository::new(conn));

    let http_client = reqwest::Client::builder().use_rustls_tls().build()?;
    let llm_endpoint = env::var("LLM_ENDPOINT").unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let llm_api_key = env::var("LLM_API_KEY").unwrap_or_default();
    let rate_limiter = LlmRateLimiter::new(
        env::var("LLM_RATE_PER_SEC").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
        env::var("LLM_RATE_BURST").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
    );
    let llm_client = Arc::new(HttpLlmClient::new(http_client, llm_endpoint, llm_api_key, rate_limiter));

    let embedding_classifier = Arc::new(UnavailableEmbeddingClassifier);
    let pipeline = Arc::new(AnalysisPipeline::new(repository.clone(), llm_client, embedding_classifier));

    let imap_pool = Arc::new(ImapConnectionPool::new());
    let mail_fetcher = Arc::new(PooledMailFetcher::new(imap_pool.clone()));

    let progress_sink = Arc::new(BroadcastProgressSink::new(256));

    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        repository.clone(),
        pipeline,
        mail_fetcher,
        progress_sink,
    ));

    let scheduler = Arc::new(Scheduler::new(repository.clone(), orchestrator.clone()));

    let shutdown = CancellationToken::new();

    let dispatcher_handle = {
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run(shutdown).await {
                tracing::error!("dispatcher job scheduler failed: {e}");
            }
        })
    };

    let app_state = AppState { repository, orchestrator };
    let router = AppRouter::create(app_state);

    let port = env::var("PORT").unwrap_or_else(|_| "5006".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().expect("PORT must be a u16")));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("server error: {e}");
        }
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("received ctrl-c, shutting down");
    shutdown.cancel();

    let _ = dispatcher_handle.await;
    server_handle.abort();
    imap_pool.close_all().await;

    Ok(())
}
