//! Operational CLI (spec.md §6). Talks to the same repository and
//! orchestrator the server uses, for ops tasks that don't need a running
//! process: forcing one schedule's execution, clearing wedged locks, and
//! seeding the prompt template catalog.
//!
//! Exit codes: 0 success, 2 invalid input, 3 transient failure, 4 fatal failure.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use entity::prompt_template;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectOptions, Database, EntityTrait, QueryFilter, Set};
use serde_json::json;
use server::embedding::UnavailableEmbeddingClassifier;
use server::error::AppError;
use server::llm::HttpLlmClient;
use server::orchestrator::{ExecutionOrchestrator, PooledMailFetcher};
use server::pipeline::AnalysisPipeline;
use server::pool::ImapConnectionPool;
use server::progress::NullProgressSink;
use server::rate_limiters::LlmRateLimiter;
use server::repository::{Repository, SeaOrmRepository};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "opctl", about = "Operational CLI for the mail scheduling core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one schedule's execution immediately, outside the dispatcher's tick/lock cycle.
    RunSchedule { schedule_id: i32 },
    /// Deletes execution locks and RUNNING executions older than the configured grace period.
    ReapLocks,
    /// Inserts the built-in prompt templates if they are not already present by name.
    SeedTemplates,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "warn");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let db_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL is not set");
            return ExitCode::from(2);
        }
    };
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);
    let conn = match Database::connect(db_options).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("database connection failed: {e}");
            return ExitCode::from(4);
        }
    };
    let repository: Arc<dyn Repository> = Arc::new(SeaOrmRepository::new(conn.clone()));

    let result = match cli.command {
        Command::RunSchedule { schedule_id } => run_schedule(repository, schedule_id).await,
        Command::ReapLocks => reap_locks(repository).await,
        Command::SeedTemplates => seed_templates(&conn).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::InvalidInput(m)) => {
            eprintln!("invalid input: {m}");
            ExitCode::from(2)
        }
        Err(CliError::Transient(m)) => {
            eprintln!("transient failure: {m}");
            ExitCode::from(3)
        }
        Err(CliError::Fatal(m)) => {
            eprintln!("fatal failure: {m}");
            ExitCode::from(4)
        }
    }
}

enum CliError {
    InvalidInput(String),
    Transient(String),
    Fatal(String),
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Transient(m) => CliError::Transient(m),
            AppError::NotFound(m) | AppError::BadRequest(m) | AppError::Validation(m) => CliError::InvalidInput(m),
            other => CliError::Fatal(other.to_string()),
        }
    }
}

async fn run_schedule(repository: Arc<dyn Repository>, schedule_id: i32) -> Result<(), CliError> {
    let schedule = repository
        .find_schedule(schedule_id)
        .await?
        .ok_or_else(|| CliError::InvalidInput(format!("schedule {schedule_id} not found")))?;

    let http_client = reqwest::Client::builder()
        .use_rustls_tls()
        .build()
        .map_err(|e| CliError::Fatal(e.to_string()))?;
    let llm_endpoint = env::var("LLM_ENDPOINT").unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let llm_api_key = env::var("LLM_API_KEY").unwrap_or_default();
    let rate_limiter = LlmRateLimiter::new(2, 10);
    let llm_client = Arc::new(HttpLlmClient::new(http_client, llm_endpoint, llm_api_key, rate_limiter));

    let pipeline = Arc::new(AnalysisPipeline::new(
        repository.clone(),
        llm_client,
        Arc::new(UnavailableEmbeddingClassifier),
    ));
    let pool = Arc::new(ImapConnectionPool::new());
    let mail_fetcher = Arc::new(PooledMailFetcher::new(pool));
    let orchestrator = ExecutionOrchestrator::new(repository, pipeline, mail_fetcher, Arc::new(NullProgressSink));

    orchestrator.run(&schedule, CancellationToken::new()).await?;
    Ok(())
}

async fn reap_locks(repository: Arc<dyn Repository>) -> Result<(), CliError> {
    let grace = server::server_config::cfg.scheduler_stale_lock_grace;
    let now = chrono::Utc::now();
    let locks = repository.reap_stale_locks(grace, now).await?;
    let executions = repository.reap_stale_executions(grace, now).await?;
    println!("reaped {locks} stale locks, {executions} stale executions");
    Ok(())
}

async fn seed_templates(conn: &sea_orm::DatabaseConnection) -> Result<(), CliError> {
    for (name, description, template) in default_templates() {
        let existing = prompt_template::Entity::find()
            .filter(prompt_template::Column::Name.eq(name))
            .one(conn)
            .await
            .map_err(|e| CliError::Fatal(e.to_string()))?;
        if existing.is_some() {
            println!("skipping {name}, already present");
            continue;
        }

        let model = prompt_template::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            description: Set(description.to_string()),
            categories: Set(json!([])),
            template: Set(template.to_string()),
            expected_output_schema: Set(expected_output_schema()),
            version: Set(1),
            is_active: Set(true),
        };
        model.insert(conn).await.map_err(|e| CliError::Fatal(e.to_string()))?;
        println!("seeded {name}");
    }
    Ok(())
}

fn expected_output_schema() -> serde_json::Value {
    json!({
        "category": "string", "priority": "string", "sentiment": "string",
        "summary": "string", "tags": ["string"], "confidence": "number",
        "importance_score": "number", "entities": "array", "action_items": "array"
    })
}

fn default_templates() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        (
            "general_analysis",
            "Default catch-all analysis template",
            "Analyze this email and respond with a single JSON object matching the \
             expected schema.\n\nSubject: {{subject}}\nFrom: {{fromAddress}}\nReceived: \
             {{receivedAt}}\n{{#if senderPriorities}}Sender priority: {{senderPriorities}}{{/if}}\n\
             {{#if emailTypePriorities}}Type priority: {{emailTypePriorities}}{{/if}}\n\n{{bodyText}}",
        ),
        (
            "invoice_analysis",
            "Specialized template for invoices and receipts",
            "This email appears to be an invoice or receipt. Extract amounts, due dates, \
             and vendor names as entities, and respond with a single JSON object matching \
             the expected schema.\n\nSubject: {{subject}}\nFrom: {{fromAddress}}\n\n{{bodyText}}",
        ),
        (
            "urgency_analysis",
            "Template emphasizing urgency/sentiment signals",
            "Analyze this email with particular attention to urgency and sentiment. \
             Respond with a single JSON object matching the expected schema.\n\nSubject: \
             {{subject}}\n{{#if llmFocus}}Focus: {{llmFocus}}{{/if}}\n\n{{bodyText}}",
        ),
    ]
}
