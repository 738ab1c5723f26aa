use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
struct SchedulerFile {
    #[serde(default = "default_tick_interval_secs")]
    tick_interval_secs: u64,
    #[serde(default = "default_stale_lock_grace_secs")]
    stale_lock_grace_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
struct ExecutionFile {
    #[serde(default = "default_max_messages_per_run")]
    max_messages_per_run: usize,
    #[serde(default = "default_batch_size")]
    default_batch_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
struct ImapFile {
    #[serde(default = "default_fetch_timeout_secs")]
    fetch_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,
    #[serde(default = "default_health_freshness_secs")]
    health_freshness_secs: u64,
    #[serde(default = "default_pool_acquire_timeout_secs")]
    pool_acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
struct LlmFile {
    #[serde(default = "default_model")]
    default_model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_per_message_timeout_secs")]
    per_message_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
struct EmbeddingFile {
    #[serde(default = "default_min_confidence")]
    min_confidence: f32,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct ConfigFile {
    #[serde(default)]
    scheduler: Option<SchedulerFile>,
    #[serde(default)]
    execution: Option<ExecutionFile>,
    #[serde(default)]
    imap: Option<ImapFile>,
    #[serde(default)]
    llm: Option<LlmFile>,
    #[serde(default)]
    embedding: Option<EmbeddingFile>,
}

fn default_tick_interval_secs() -> u64 {
    60
}
fn default_stale_lock_grace_secs() -> u64 {
    600
}
fn default_max_messages_per_run() -> usize {
    1000
}
fn default_batch_size() -> u32 {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_health_freshness_secs() -> u64 {
    60
}
fn default_pool_acquire_timeout_secs() -> u64 {
    60
}
fn default_model() -> String {
    "mistral-small-latest".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_per_message_timeout_secs() -> u64 {
    60
}
fn default_min_confidence() -> f32 {
    0.7
}

/// Recognized options, exactly the set this system understands. Every key
/// is optional in `config.toml`/environment and falls back to the default
/// named above.
pub struct ServerConfig {
    pub scheduler_tick_interval: Duration,
    pub scheduler_stale_lock_grace: Duration,
    pub execution_max_messages_per_run: usize,
    pub execution_default_batch_size: u32,
    pub imap_fetch_timeout: Duration,
    pub imap_connect_timeout: Duration,
    pub imap_health_freshness: Duration,
    pub imap_pool_acquire_timeout: Duration,
    pub llm_default_model: String,
    pub llm_temperature: f32,
    pub llm_per_message_timeout: Duration,
    pub embedding_min_confidence: f32,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tick={:?} staleLockGrace={:?} maxMessagesPerRun={} batchSize={} llmModel={}",
            self.scheduler_tick_interval,
            self.scheduler_stale_lock_grace,
            self.execution_max_messages_per_run,
            self.execution_default_batch_size,
            self.llm_default_model,
        )
    }
}

impl ServerConfig {
    fn from_file(path: &str) -> Result<ConfigFile, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn load() -> Self {
        let root = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        let path = format!("{root}/config");
        let file = Self::from_file(&path).unwrap_or_default();

        let scheduler = file.scheduler.unwrap_or_else(|| SchedulerFile {
            tick_interval_secs: default_tick_interval_secs(),
            stale_lock_grace_secs: default_stale_lock_grace_secs(),
        });
        let execution = file.execution.unwrap_or_else(|| ExecutionFile {
            max_messages_per_run: default_max_messages_per_run(),
            default_batch_size: default_batch_size(),
        });
        let imap = file.imap.unwrap_or_else(|| ImapFile {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            health_freshness_secs: default_health_freshness_secs(),
            pool_acquire_timeout_secs: default_pool_acquire_timeout_secs(),
        });
        let llm = file.llm.unwrap_or_else(|| LlmFile {
            default_model: default_model(),
            temperature: default_temperature(),
            per_message_timeout_secs: default_per_message_timeout_secs(),
        });
        let embedding = file.embedding.unwrap_or_else(|| EmbeddingFile {
            min_confidence: default_min_confidence(),
        });

        ServerConfig {
            scheduler_tick_interval: Duration::from_secs(scheduler.tick_interval_secs),
            scheduler_stale_lock_grace: Duration::from_secs(scheduler.stale_lock_grace_secs),
            execution_max_messages_per_run: execution.max_messages_per_run,
            execution_default_batch_size: execution.default_batch_size,
            imap_fetch_timeout: Duration::from_secs(imap.fetch_timeout_secs),
            imap_connect_timeout: Duration::from_secs(imap.connect_timeout_secs),
            imap_health_freshness: Duration::from_secs(imap.health_freshness_secs),
            imap_pool_acquire_timeout: Duration::from_secs(imap.pool_acquire_timeout_secs),
            llm_default_model: llm.default_model,
            llm_temperature: llm.temperature,
            llm_per_message_timeout: Duration::from_secs(llm.per_message_timeout_secs),
            embedding_min_confidence: embedding.min_confidence,
        }
    }
}

#[allow(non_upper_case_globals)]
lazy_static! {
    pub static ref cfg: ServerConfig = ServerConfig::load();
}
