//! Execution orchestrator (spec.md §4.8): turns one fired `Schedule` into a
//! `ScheduleExecution`, drives the fetch → batch → analyze loop, and settles
//! the execution to a terminal state. Talks to IMAP only through
//! [`MailFetcher`] so this module's control flow can be unit-tested without
//! a real mailbox.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::email_account;
use entity::schedule;
use entity::sea_orm_active_enums::{ExecutionStatus, ProcessingStatus, ProcessingType};
use lib_mail::{CanonicalMessage, FetchOptions, ImapAccount};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::pipeline::{AnalysisPipeline, EmailProcessingResult};
use crate::pool::ImapConnectionPool;
use crate::progress::{ProgressCounters, ProgressSink, ProgressStage, ProgressUpdate};
use crate::repository::{ExecutionOutcome, ExecutionProgress, ProcessedEmailUpsert, Repository, ScheduleAdvance};
use crate::cron;
use crate::server_config::cfg;

/// Produces canonical messages for one account over a date range. The
/// production implementation wraps [`ImapConnectionPool`]; tests substitute
/// a fake that returns canned messages or errors.
///
/// Split into a cheap UID listing and a per-batch body fetch so the
/// orchestrator can reaffirm IMAP health and isolate a failure to the batch
/// it happened in (spec.md §4.8 steps 5a/5d) instead of one bulk fetch that
/// fails the whole execution.
#[async_trait]
pub trait MailFetcher: Send + Sync {
    async fn list_uids(
        &self,
        account: &email_account::Model,
        since: DateTime<Utc>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<u32>>;

    async fn fetch_uids(&self, account: &email_account::Model, uids: &[u32]) -> AppResult<Vec<CanonicalMessage>>;
}

/// Checks out the account's pooled connection per call and releases it
/// straight back (the pool leaves the session cached, so a same-account
/// call shortly after reuses it rather than re-dialing). `fetch_uids` going
/// through `acquire` means every batch gets its own health reaffirm before
/// the IMAP round trip.
pub struct PooledMailFetcher {
    pool: Arc<ImapConnectionPool>,
}

impl PooledMailFetcher {
    pub fn new(pool: Arc<ImapConnectionPool>) -> Self {
        Self { pool }
    }

    async fn acquire(&self, account: &email_account::Model) -> AppResult<crate::pool::PooledConnection> {
        let imap_account = to_imap_account(account);
        self.pool
            .acquire(
                &imap_account,
                account.id,
                cfg.imap_connect_timeout,
                cfg.imap_health_freshness,
                cfg.imap_pool_acquire_timeout,
            )
            .await
    }
}

#[async_trait]
impl MailFetcher for PooledMailFetcher {
    async fn list_uids(
        &self,
        account: &email_account::Model,
        since: DateTime<Utc>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<u32>> {
        let mut conn = self.acquire(account).await?;
        let listed = {
            let session = conn.session()?;
            session
                .list_uids(
                    &FetchOptions {
                        folder: "INBOX".to_string(),
                        since: Some(since),
                        before: Some(before),
                        limit,
                    },
                    cfg.imap_fetch_timeout,
                )
                .await
        };
        self.pool.release(conn).await;
        Ok(listed?)
    }

    async fn fetch_uids(&self, account: &email_account::Model, uids: &[u32]) -> AppResult<Vec<CanonicalMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.acquire(account).await?;
        let fetched = {
            let session = conn.session()?;
            session.fetch_by_uids("INBOX", uids, cfg.imap_fetch_timeout).await
        };
        self.pool.release(conn).await;
        Ok(fetched?)
    }
}

fn to_imap_account(account: &email_account::Model) -> ImapAccount {
    ImapAccount {
        account_id: account.id.to_string(),
        host: account.imap_host.clone(),
        port: account.imap_port as u16,
        username: account.imap_username.clone(),
        // `credential_ref` is an opaque handle the (out-of-scope) account
        // store resolves to a real secret; this core treats it as the
        // password directly since no account store is wired in here.
        password: account.credential_ref.clone(),
        use_tls: account.use_tls,
    }
}

enum RunOutcome {
    Completed(ExecutionProgress),
    Cancelled(ExecutionProgress),
}

pub struct ExecutionOrchestrator {
    repository: Arc<dyn Repository>,
    pipeline: Arc<AnalysisPipeline>,
    mail_fetcher: Arc<dyn MailFetcher>,
    progress: Arc<dyn ProgressSink>,
}

impl ExecutionOrchestrator {
    pub fn new(
        repository: Arc<dyn Repository>,
        pipeline: Arc<AnalysisPipeline>,
        mail_fetcher: Arc<dyn MailFetcher>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            repository,
            pipeline,
            mail_fetcher,
            progress,
        }
    }

    /// Runs one schedule's execution end to end. Only returns `Err` when
    /// the execution row itself could not be created (repository
    /// connectivity loss); every other failure mode is captured as the
    /// execution's terminal `FAILED` state and this returns `Ok(())`, per
    /// spec.md §7's propagation policy — the dispatcher never dies from a
    /// single schedule's misfortune.
    pub async fn run(&self, schedule: &schedule::Model, cancel: CancellationToken) -> AppResult<()> {
        let execution = self.repository.create_execution(schedule.id, 1).await?;
        let started_at = Utc::now();

        let outcome = self.run_execution(schedule, execution.id, &cancel).await;
        let duration_ms = (Utc::now() - started_at).num_milliseconds();

        match outcome {
            Ok(RunOutcome::Completed(counters)) => {
                self.repository
                    .finish_execution(
                        execution.id,
                        ExecutionStatus::Completed,
                        ExecutionOutcome {
                            processing_duration_ms: Some(duration_ms),
                            error_message: None,
                            error_details: None,
                        },
                    )
                    .await?;
                self.advance_on_success(schedule, counters.processed_emails_count as i64).await?;
            }
            Ok(RunOutcome::Cancelled(_)) => {
                self.repository
                    .finish_execution(execution.id, ExecutionStatus::Cancelled, ExecutionOutcome::default())
                    .await?;
                // A cancelled execution still needs nextExecutionAt moved
                // past `now`, or loadDueSchedules would pick it straight
                // back up on the following tick. advance_on_failure already
                // recomputes the next firing (and, for DATE_RANGE/
                // SPECIFIC_DATES, disables/advances appropriately) without
                // crediting emails processed, which is exactly the
                // "wait out the normal cadence" behavior documented in
                // DESIGN.md's Open Question resolution.
                self.advance_on_failure(schedule).await?;
            }
            Err(e) => {
                tracing::error!(schedule_id = schedule.id, "execution failed: {e}");
                self.repository
                    .finish_execution(
                        execution.id,
                        ExecutionStatus::Failed,
                        ExecutionOutcome {
                            processing_duration_ms: Some(duration_ms),
                            error_message: Some(e.to_string()),
                            error_details: None,
                        },
                    )
                    .await?;
                self.advance_on_failure(schedule).await?;
            }
        }

        Ok(())
    }

    async fn run_execution(
        &self,
        schedule: &schedule::Model,
        execution_id: i32,
        cancel: &CancellationToken,
    ) -> AppResult<RunOutcome> {
        let (since, before) = self.compute_date_range(schedule).await?;

        self.progress.publish(ProgressUpdate {
            user_id: schedule.user_id,
            email_account_id: schedule.email_account_id,
            stage: ProgressStage::Connecting,
            progress: 0,
            counters: ProgressCounters::default(),
        });

        let account = self
            .repository
            .email_account(schedule.email_account_id)
            .await?
            .ok_or_else(|| AppError::Permanent(format!("email account {} not found", schedule.email_account_id)))?;

        self.progress.publish(ProgressUpdate {
            user_id: schedule.user_id,
            email_account_id: schedule.email_account_id,
            stage: ProgressStage::Fetching,
            progress: 5,
            counters: ProgressCounters::default(),
        });

        let uids = self
            .mail_fetcher
            .list_uids(&account, since, before, cfg.execution_max_messages_per_run)
            .await?;

        self.run_batches(schedule, execution_id, &account, uids, cancel).await
    }

    async fn run_batches(
        &self,
        schedule: &schedule::Model,
        execution_id: i32,
        account: &email_account::Model,
        uids: Vec<u32>,
        cancel: &CancellationToken,
    ) -> AppResult<RunOutcome> {
        let batch_size = schedule.batch_size.max(1) as usize;
        let total_emails = uids.len() as i32;
        let total_batches = uids.chunks(batch_size).count() as i32;

        let mut counters = ExecutionProgress {
            total_batches_count: total_batches,
            total_emails_count: total_emails,
            ..Default::default()
        };
        self.repository.update_execution_progress(execution_id, counters).await?;

        for uid_batch in uids.chunks(batch_size) {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled(counters));
            }

            // Step 5a: each batch re-fetches its own bodies through the pool,
            // which reaffirms IMAP health on `acquire`. A batch-level IMAP
            // failure here only fails this batch's messages (step 5d); the
            // execution moves on to the next batch rather than aborting.
            let batch = match self.mail_fetcher.fetch_uids(account, uid_batch).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(execution_id, "batch fetch failed, marking batch as failed: {e}");
                    counters.failed_emails_count += uid_batch.len() as i32;
                    counters.completed_batches_count += 1;
                    self.repository.update_execution_progress(execution_id, counters).await?;
                    continue;
                }
            };

            for email in &batch {
                if cancel.is_cancelled() {
                    return Ok(RunOutcome::Cancelled(counters));
                }

                let outcome = self
                    .pipeline
                    .process_message(schedule.email_account_id, email, schedule, Some(execution_id))
                    .await;

                match outcome {
                    EmailProcessingResult::Success { .. } => counters.processed_emails_count += 1,
                    EmailProcessingResult::Failure { error, message_id } => {
                        counters.failed_emails_count += 1;
                        tracing::debug!(message_id = %message_id, "message failed: {error}");
                    }
                }
            }

            counters.completed_batches_count += 1;
            self.repository.update_execution_progress(execution_id, counters).await?;
            self.progress.publish(ProgressUpdate {
                user_id: schedule.user_id,
                email_account_id: schedule.email_account_id,
                stage: ProgressStage::Processing,
                progress: progress_percent(counters),
                counters: ProgressCounters {
                    processed: counters.processed_emails_count as i64,
                    failed: counters.failed_emails_count as i64,
                    total: counters.total_emails_count as i64,
                },
            });
        }

        self.progress.publish(ProgressUpdate {
            user_id: schedule.user_id,
            email_account_id: schedule.email_account_id,
            stage: ProgressStage::Completed,
            progress: 100,
            counters: ProgressCounters {
                processed: counters.processed_emails_count as i64,
                failed: counters.failed_emails_count as i64,
                total: counters.total_emails_count as i64,
            },
        });

        Ok(RunOutcome::Completed(counters))
    }

    async fn compute_date_range(&self, schedule: &schedule::Model) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
        match schedule.processing_type {
            ProcessingType::DateRange => {
                let from = schedule
                    .date_range_from
                    .ok_or_else(|| AppError::Permanent("DATE_RANGE schedule missing dateRangeFrom".to_string()))?;
                let to = schedule
                    .date_range_to
                    .ok_or_else(|| AppError::Permanent("DATE_RANGE schedule missing dateRangeTo".to_string()))?;
                Ok((from.with_timezone(&Utc), to.with_timezone(&Utc)))
            }
            ProcessingType::Recurring => {
                let since = match self.repository.last_successful_execution(schedule.id).await? {
                    Some(exec) => exec
                        .completed_at
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|| schedule.created_at.with_timezone(&Utc)),
                    None => schedule.created_at.with_timezone(&Utc),
                };
                Ok((since, Utc::now()))
            }
            ProcessingType::SpecificDates => {
                let now = Utc::now();
                let next = next_future_specific_date(schedule, now)
                    .ok_or_else(|| AppError::Permanent("no future date remains for SPECIFIC_DATES schedule".to_string()))?;
                Ok((next, next + chrono::Duration::hours(24)))
            }
        }
    }

    async fn advance_on_success(&self, schedule: &schedule::Model, emails_processed: i64) -> AppResult<()> {
        let now = Utc::now();
        let advance = match schedule.processing_type {
            ProcessingType::DateRange => ScheduleAdvance::DateRangeDone {
                last_executed_at: now,
                emails_processed,
            },
            ProcessingType::Recurring => {
                let expr = schedule.cron_expression.as_deref().unwrap_or("* * * * *");
                let next = cron::next_fire(expr, &schedule.timezone, now)
                    .map_err(|e| AppError::Permanent(format!("cron evaluation failed: {e}")))?;
                ScheduleAdvance::Recurring {
                    next_execution_at: next,
                    last_executed_at: now,
                    emails_processed,
                }
            }
            ProcessingType::SpecificDates => ScheduleAdvance::SpecificDates {
                next_execution_at: next_future_specific_date(schedule, now),
                last_executed_at: now,
                emails_processed,
            },
        };
        self.repository.advance_schedule(schedule.id, advance).await
    }

    async fn advance_on_failure(&self, schedule: &schedule::Model) -> AppResult<()> {
        let now = Utc::now();
        let next_execution_at = match schedule.processing_type {
            ProcessingType::DateRange => None,
            ProcessingType::Recurring => schedule
                .cron_expression
                .as_deref()
                .and_then(|expr| cron::next_fire(expr, &schedule.timezone, now).ok()),
            ProcessingType::SpecificDates => next_future_specific_date(schedule, now),
        };
        self.repository
            .advance_schedule(
                schedule.id,
                ScheduleAdvance::Failed {
                    next_execution_at,
                    last_executed_at: now,
                },
            )
            .await
    }
}

fn next_future_specific_date(schedule: &schedule::Model, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let dates = schedule.specific_dates.as_ref()?.as_array()?;
    dates
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| *d > now)
        .min()
}

fn progress_percent(counters: ExecutionProgress) -> u8 {
    if counters.total_batches_count == 0 {
        return 100;
    }
    let pct = (counters.completed_batches_count as f64 / counters.total_batches_count as f64) * 100.0;
    pct.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::UnavailableEmbeddingClassifier;
    use crate::llm::{ChatRequest, ChatResponse, LlmClient};
    use crate::repository::fake::InMemoryRepository;
    use entity::sea_orm_active_enums::LlmFocus;
    use serde_json::json;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn execute_chat(&self, _request: ChatRequest) -> AppResult<ChatResponse> {
            Ok(ChatResponse {
                response: self.0.clone(),
                message: None,
                usage: None,
            })
        }
    }

    struct FakeMailFetcher {
        messages: Vec<CanonicalMessage>,
    }

    #[async_trait]
    impl MailFetcher for FakeMailFetcher {
        async fn list_uids(
            &self,
            _account: &email_account::Model,
            _since: DateTime<Utc>,
            _before: DateTime<Utc>,
            _limit: usize,
        ) -> AppResult<Vec<u32>> {
            Ok(self.messages.iter().map(|m| m.uid).collect())
        }

        async fn fetch_uids(&self, _account: &email_account::Model, uids: &[u32]) -> AppResult<Vec<CanonicalMessage>> {
            Ok(self
                .messages
                .iter()
                .filter(|m| uids.contains(&m.uid))
                .cloned()
                .collect())
        }
    }

    /// Fails UID listing outright, modeling an IMAP outage at the start of
    /// an execution (no batches ever get a chance to run).
    struct FailingMailFetcher;

    #[async_trait]
    impl MailFetcher for FailingMailFetcher {
        async fn list_uids(
            &self,
            _account: &email_account::Model,
            _since: DateTime<Utc>,
            _before: DateTime<Utc>,
            _limit: usize,
        ) -> AppResult<Vec<u32>> {
            Err(AppError::Transient("connection refused".to_string()))
        }

        async fn fetch_uids(&self, _account: &email_account::Model, _uids: &[u32]) -> AppResult<Vec<CanonicalMessage>> {
            Err(AppError::Transient("connection refused".to_string()))
        }
    }

    /// Lists UIDs fine but fails fetching the body for one specific batch,
    /// modeling a mid-run IMAP hiccup that should only sink that batch.
    struct FlakyBatchMailFetcher {
        messages: Vec<CanonicalMessage>,
        fails_uid: u32,
    }

    #[async_trait]
    impl MailFetcher for FlakyBatchMailFetcher {
        async fn list_uids(
            &self,
            _account: &email_account::Model,
            _since: DateTime<Utc>,
            _before: DateTime<Utc>,
            _limit: usize,
        ) -> AppResult<Vec<u32>> {
            Ok(self.messages.iter().map(|m| m.uid).collect())
        }

        async fn fetch_uids(&self, _account: &email_account::Model, uids: &[u32]) -> AppResult<Vec<CanonicalMessage>> {
            if uids.contains(&self.fails_uid) {
                return Err(AppError::Transient("batch fetch failed".to_string()));
            }
            Ok(self
                .messages
                .iter()
                .filter(|m| uids.contains(&m.uid))
                .cloned()
                .collect())
        }
    }

    fn account_fixture() -> email_account::Model {
        email_account::Model {
            id: 1,
            user_id: 1,
            email_address: "me@me.com".to_string(),
            imap_host: "imap.example.com".to_string(),
            imap_port: 993,
            imap_username: "me@me.com".to_string(),
            use_tls: true,
            credential_ref: "cred-1".to_string(),
        }
    }

    fn schedule_fixture(processing_type: ProcessingType) -> schedule::Model {
        let now = Utc::now();
        schedule::Model {
            id: 1,
            user_id: 1,
            email_account_id: 1,
            name: "test".to_string(),
            processing_type,
            date_range_from: Some((now - chrono::Duration::days(1)).into()),
            date_range_to: Some(now.into()),
            cron_expression: Some("0 9 * * MON".to_string()),
            timezone: "UTC".to_string(),
            specific_dates: None,
            batch_size: 2,
            sender_priorities: json!({}),
            email_type_priorities: json!({}),
            llm_focus: LlmFocus::General,
            is_enabled: true,
            is_default: false,
            next_execution_at: Some(now.into()),
            last_executed_at: None,
            total_executions: 0,
            total_emails_processed: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn message(uid: u32, id: &str) -> CanonicalMessage {
        CanonicalMessage {
            uid,
            message_id: id.to_string(),
            subject: Some("Hi".to_string()),
            from: "a@b.com".to_string(),
            to: vec![],
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body_text: Some("body".to_string()),
            body_html: None,
            flags: vec![],
        }
    }

    async fn repo_with_account_and_template() -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_email_account(account_fixture()).await;
        repo.insert_template(entity::prompt_template::Model {
            id: 1,
            name: "general_analysis".to_string(),
            description: String::new(),
            categories: json!([]),
            template: "Subject: {{subject}}".to_string(),
            expected_output_schema: json!({}),
            version: 1,
            is_active: true,
        })
        .await;
        repo
    }

    #[tokio::test]
    async fn completes_execution_and_advances_date_range_schedule() {
        let repo = repo_with_account_and_template().await;
        let schedule = schedule_fixture(ProcessingType::DateRange);
        repo.insert_schedule(schedule.clone()).await;

        let llm = Arc::new(FixedLlm(r#"{"category":"WORK","priority":"MEDIUM","sentiment":"NEUTRAL","summary":"ok"}"#.to_string()));
        let pipeline = Arc::new(AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier)));
        let fetcher = Arc::new(FakeMailFetcher {
            messages: vec![message(1, "m-1"), message(2, "m-2"), message(3, "m-3")],
        });
        let orchestrator = ExecutionOrchestrator::new(repo.clone(), pipeline, fetcher, Arc::new(crate::progress::NullProgressSink));

        orchestrator.run(&schedule, CancellationToken::new()).await.unwrap();

        let updated = repo.get_schedule(schedule.id).await.unwrap();
        assert!(!updated.is_enabled);
        assert_eq!(updated.total_emails_processed, 3);
        assert_eq!(updated.total_executions, 1);
    }

    #[tokio::test]
    async fn fetch_failure_marks_execution_failed_without_killing_dispatcher() {
        let repo = repo_with_account_and_template().await;
        let schedule = schedule_fixture(ProcessingType::DateRange);
        repo.insert_schedule(schedule.clone()).await;

        let llm = Arc::new(FixedLlm(r#"{"category":"WORK"}"#.to_string()));
        let pipeline = Arc::new(AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier)));
        let orchestrator = ExecutionOrchestrator::new(
            repo.clone(),
            pipeline,
            Arc::new(FailingMailFetcher),
            Arc::new(crate::progress::NullProgressSink),
        );

        let result = orchestrator.run(&schedule, CancellationToken::new()).await;
        assert!(result.is_ok());

        let exec = repo.get_execution(1).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_mid_batch_settles_as_cancelled() {
        let repo = repo_with_account_and_template().await;
        let mut schedule = schedule_fixture(ProcessingType::Recurring);
        let now = Utc::now();
        schedule.next_execution_at = Some(now.into());
        repo.insert_schedule(schedule.clone()).await;

        let llm = Arc::new(FixedLlm(r#"{"category":"WORK"}"#.to_string()));
        let pipeline = Arc::new(AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier)));
        let fetcher = Arc::new(FakeMailFetcher {
            messages: vec![message(1, "m-a"), message(2, "m-b")],
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = ExecutionOrchestrator::new(repo.clone(), pipeline, fetcher, Arc::new(crate::progress::NullProgressSink));

        orchestrator.run(&schedule, cancel).await.unwrap();

        let exec = repo.get_execution(1).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);

        // next_execution_at must move past `now`, or the very next dispatcher
        // tick would pick this schedule up again as still-due.
        let updated = repo.get_schedule(schedule.id).await.unwrap();
        let next = updated.next_execution_at.unwrap().with_timezone(&Utc);
        assert!(next > now);
        assert_eq!(updated.total_emails_processed, 0);
    }

    #[tokio::test]
    async fn batch_fetch_failure_fails_only_that_batch() {
        let repo = repo_with_account_and_template().await;
        let mut schedule = schedule_fixture(ProcessingType::DateRange);
        schedule.batch_size = 1;
        repo.insert_schedule(schedule.clone()).await;

        let llm = Arc::new(FixedLlm(r#"{"category":"WORK"}"#.to_string()));
        let pipeline = Arc::new(AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier)));
        let fetcher = Arc::new(FlakyBatchMailFetcher {
            messages: vec![message(1, "m-1"), message(2, "m-2"), message(3, "m-3")],
            fails_uid: 2,
        });
        let orchestrator = ExecutionOrchestrator::new(repo.clone(), pipeline, fetcher, Arc::new(crate::progress::NullProgressSink));

        orchestrator.run(&schedule, CancellationToken::new()).await.unwrap();

        // A failed batch's fetch does not abort the run; it settles
        // COMPLETED with the surviving batches credited and the failed
        // one's messages counted as failed, not silently dropped.
        let exec = repo.get_execution(1).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);

        let updated = repo.get_schedule(schedule.id).await.unwrap();
        assert_eq!(updated.total_emails_processed, 2);
    }

    #[test]
    fn specific_dates_picks_earliest_future_date() {
        let now = Utc::now();
        let mut schedule = schedule_fixture(ProcessingType::SpecificDates);
        schedule.specific_dates = Some(json!([
            (now - chrono::Duration::days(1)).to_rfc3339(),
            (now + chrono::Duration::days(2)).to_rfc3339(),
            (now + chrono::Duration::days(1)).to_rfc3339(),
        ]));
        let picked = next_future_specific_date(&schedule, now).unwrap();
        assert!(picked > now + chrono::Duration::hours(23));
        assert!(picked < now + chrono::Duration::days(2));
    }

    #[test]
    fn specific_dates_returns_none_when_exhausted() {
        let now = Utc::now();
        let mut schedule = schedule_fixture(ProcessingType::SpecificDates);
        schedule.specific_dates = Some(json!([(now - chrono::Duration::days(1)).to_rfc3339()]));
        assert!(next_future_specific_date(&schedule, now).is_none());
    }
}
