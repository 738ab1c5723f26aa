//! Dispatcher (spec.md §4.9): a one-minute tick that loads due schedules,
//! groups them by firing minute, and runs each group's executions
//! concurrently under the execution lock's cluster-wide mutual exclusion.
//! A single schedule's failure never stops the tick loop — every error path
//! here is logged, not propagated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use entity::schedule;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::ExecutionOrchestrator;
use crate::repository::Repository;
use crate::server_config::cfg;

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - chrono::Duration::nanoseconds(t.timestamp_subsec_nanos() as i64) - chrono::Duration::seconds(t.second() as i64)
}

pub struct Scheduler {
    repository: Arc<dyn Repository>,
    orchestrator: Arc<ExecutionOrchestrator>,
}

impl Scheduler {
    pub fn new(repository: Arc<dyn Repository>, orchestrator: Arc<ExecutionOrchestrator>) -> Self {
        Self { repository, orchestrator }
    }

    /// One dispatcher pass: loads due schedules, groups them by firing
    /// minute, and runs each group under its execution lock. `shutdown` is
    /// handed down (as a child token) to every execution this starts, so a
    /// ctrl-c cancels in-flight work rather than abandoning it. Called once
    /// per tick by the `tokio_cron_scheduler` job wired up in `main`.
    pub async fn tick(&self, shutdown: &CancellationToken) {
        let now = Utc::now();
        let due = match self.repository.load_due_schedules(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("failed to load due schedules: {e}");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        let mut groups: HashMap<DateTime<Utc>, Vec<schedule::Model>> = HashMap::new();
        for schedule in due {
            let key = truncate_to_minute(
                schedule
                    .next_execution_at
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(now),
            );
            groups.entry(key).or_default().push(schedule);
        }

        for (execution_time, schedules) in groups {
            let ids: Vec<i32> = schedules.iter().map(|s| s.id).collect();
            match self.repository.try_acquire_execution_lock(execution_time, &ids).await {
                Ok(true) => self.run_group(execution_time, schedules, shutdown.child_token()).await,
                Ok(false) => {
                    tracing::warn!(?execution_time, schedule_ids = ?ids, "execution lock already held, skipping group");
                }
                Err(e) => {
                    tracing::error!("failed to acquire execution lock for {execution_time}: {e}");
                }
            }
        }
    }

    async fn run_group(&self, execution_time: DateTime<Utc>, schedules: Vec<schedule::Model>, cancel: CancellationToken) {
        let mut handles = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let orchestrator = self.orchestrator.clone();
            let token = cancel.child_token();
            let schedule_id = schedule.id;
            handles.push(tokio::spawn(async move {
                if let Err(e) = orchestrator.run(&schedule, token).await {
                    tracing::error!(schedule_id, "schedule execution errored: {e}");
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("execution task panicked: {e}");
            }
        }

        if let Err(e) = self.repository.release_execution_lock(execution_time).await {
            tracing::error!("failed to release execution lock for {execution_time}: {e}");
        }
    }

    /// Runs the dispatcher for the lifetime of the process: a
    /// `tokio_cron_scheduler` job fires [`Scheduler::tick`] every minute
    /// and a second job runs the stale-lock/execution janitor pass every
    /// five minutes, mirroring how the project's own `main.rs` drives its
    /// housekeeping jobs off the same `JobScheduler`. Returns once
    /// `shutdown` is cancelled, after the underlying `JobScheduler` has
    /// been told to stop.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), JobSchedulerError> {
        self.reap_stale().await;

        let mut job_scheduler = JobScheduler::new().await?;

        let tick_scheduler = self.clone();
        let tick_shutdown = shutdown.clone();
        job_scheduler
            .add(Job::new_async("0 * * * * *", move |_uuid, _lock| {
                let scheduler = tick_scheduler.clone();
                let shutdown = tick_shutdown.clone();
                Box::pin(async move {
                    scheduler.tick(&shutdown).await;
                })
            })?)
            .await?;

        let janitor_scheduler = self.clone();
        job_scheduler
            .add(Job::new_repeated_async(
                std::time::Duration::from_secs(300),
                move |_uuid, _lock| {
                    let scheduler = janitor_scheduler.clone();
                    Box::pin(async move {
                        scheduler.reap_stale().await;
                    })
                },
            )?)
            .await?;

        job_scheduler.start().await?;
        shutdown.cancelled().await;
        tracing::info!("dispatcher shutting down");
        job_scheduler.shutdown().await?;
        Ok(())
    }

    /// Startup/periodic janitor pass: reclaims locks and executions left
    /// behind by a crashed worker (spec.md §5 shared resources).
    pub async fn reap_stale(&self) {
        match self
            .repository
            .reap_stale_locks(cfg.scheduler_stale_lock_grace, Utc::now())
            .await
        {
            Ok(n) if n > 0 => tracing::info!(count = n, "reaped stale execution locks"),
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to reap stale locks: {e}"),
        }

        match self
            .repository
            .reap_stale_executions(cfg.scheduler_stale_lock_grace, Utc::now())
            .await
        {
            Ok(n) if n > 0 => tracing::info!(count = n, "reaped stale executions"),
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to reap stale executions: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::UnavailableEmbeddingClassifier;
    use crate::llm::{ChatRequest, ChatResponse, LlmClient};
    use crate::orchestrator::MailFetcher;
    use crate::pipeline::AnalysisPipeline;
    use crate::progress::NullProgressSink;
    use crate::repository::fake::InMemoryRepository;
    use async_trait::async_trait;
    use entity::email_account;
    use entity::sea_orm_active_enums::{LlmFocus, ProcessingType};
    use lib_mail::CanonicalMessage;
    use serde_json::json;

    struct FixedLlm;

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn execute_chat(&self, _request: ChatRequest) -> crate::error::AppResult<ChatResponse> {
            Ok(ChatResponse {
                response: r#"{"category":"WORK","priority":"MEDIUM","sentiment":"NEUTRAL","summary":"ok"}"#.to_string(),
                message: None,
                usage: None,
            })
        }
    }

    struct EmptyMailFetcher;

    #[async_trait]
    impl MailFetcher for EmptyMailFetcher {
        async fn list_uids(
            &self,
            _account: &email_account::Model,
            _since: DateTime<Utc>,
            _before: DateTime<Utc>,
            _limit: usize,
        ) -> crate::error::AppResult<Vec<u32>> {
            Ok(Vec::new())
        }

        async fn fetch_uids(
            &self,
            _account: &email_account::Model,
            _uids: &[u32],
        ) -> crate::error::AppResult<Vec<CanonicalMessage>> {
            Ok(Vec::new())
        }
    }

    fn due_schedule(id: i32) -> schedule::Model {
        let now = Utc::now();
        schedule::Model {
            id,
            user_id: 1,
            email_account_id: 1,
            name: format!("schedule-{id}"),
            processing_type: ProcessingType::Recurring,
            date_range_from: None,
            date_range_to: None,
            cron_expression: Some("0 9 * * MON".to_string()),
            timezone: "UTC".to_string(),
            specific_dates: None,
            batch_size: 5,
            sender_priorities: json!({}),
            email_type_priorities: json!({}),
            llm_focus: LlmFocus::General,
            is_enabled: true,
            is_default: false,
            next_execution_at: Some((now - chrono::Duration::seconds(1)).into()),
            last_executed_at: None,
            total_executions: 0,
            total_emails_processed: 0,
            created_at: (now - chrono::Duration::days(1)).into(),
            updated_at: now.into(),
        }
    }

    fn scheduler_fixture(repo: Arc<InMemoryRepository>) -> Scheduler {
        let pipeline = Arc::new(AnalysisPipeline::new(
            repo.clone(),
            Arc::new(FixedLlm),
            Arc::new(UnavailableEmbeddingClassifier),
        ));
        let orchestrator = Arc::new(ExecutionOrchestrator::new(
            repo.clone(),
            pipeline,
            Arc::new(EmptyMailFetcher),
            Arc::new(NullProgressSink),
        ));
        Scheduler::new(repo, orchestrator)
    }

    #[tokio::test]
    async fn tick_runs_due_schedule_and_releases_lock() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_email_account(email_account::Model {
            id: 1,
            user_id: 1,
            email_address: "me@me.com".to_string(),
            imap_host: "imap.example.com".to_string(),
            imap_port: 993,
            imap_username: "me@me.com".to_string(),
            use_tls: true,
            credential_ref: "cred".to_string(),
        })
        .await;
        repo.insert_schedule(due_schedule(1)).await;

        let scheduler = scheduler_fixture(repo.clone());
        let shutdown = CancellationToken::new();
        scheduler.tick(&shutdown).await;

        assert_eq!(repo.lock_count().await, 0);
        let updated = repo.get_schedule(1).await.unwrap();
        assert_eq!(updated.total_executions, 1);
    }

    #[tokio::test]
    async fn second_tick_for_same_minute_skips_already_locked_group() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_email_account(email_account::Model {
            id: 1,
            user_id: 1,
            email_address: "me@me.com".to_string(),
            imap_host: "imap.example.com".to_string(),
            imap_port: 993,
            imap_username: "me@me.com".to_string(),
            use_tls: true,
            credential_ref: "cred".to_string(),
        })
        .await;
        let schedule = due_schedule(1);
        let execution_time = truncate_to_minute(schedule.next_execution_at.unwrap().with_timezone(&Utc));
        repo.insert_schedule(schedule).await;

        assert!(repo.try_acquire_execution_lock(execution_time, &[1]).await.unwrap());

        let scheduler = scheduler_fixture(repo.clone());
        let shutdown = CancellationToken::new();
        scheduler.tick(&shutdown).await;

        // The lock held above was never released by this tick, so the
        // schedule's own execution never ran.
        let updated = repo.get_schedule(1).await.unwrap();
        assert_eq!(updated.total_executions, 0);
    }
}
