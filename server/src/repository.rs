//! Durable storage contracts for schedules, executions, processed messages,
//! and the execution-lock registry. This module defines the abstract
//! `Repository` trait the rest of the core depends on, plus the
//! `sea-orm`/Postgres implementation; tests elsewhere use the in-memory
//! fake in `repository::fake` instead of a real database.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::prelude::*;
use entity::sea_orm_active_enums::{
    ActionType, Category, EntityType, ExecutionStatus, LlmFocus, Priority, ProcessingStatus,
    Sentiment,
};
use entity::{action_item, email_account, entity_extraction, processed_email, prompt_template, schedule, schedule_execution};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde_json::Value as Json;

use crate::error::{AppError, AppResult};

/// Counters written after each batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionProgress {
    pub total_batches_count: i32,
    pub completed_batches_count: i32,
    pub total_emails_count: i32,
    pub processed_emails_count: i32,
    pub failed_emails_count: i32,
}

/// Terminal outcome written by `finishExecution`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub processing_duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub error_details: Option<Json>,
}

pub struct EntityUpsert {
    pub entity_type: EntityType,
    pub entity_value: String,
    pub confidence: f32,
    pub context: Option<String>,
}

pub struct ActionUpsert {
    pub action_type: ActionType,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

/// The desired post-analysis state of a `ProcessedEmail` row.
/// `processing_status` is either `Completed` or `Failed`; `Pending`/
/// `Processing` are handled by `mark_processing` instead.
pub struct ProcessedEmailUpsert {
    pub message_id: String,
    pub email_account_id: i32,
    pub uid: i64,
    pub subject: Option<String>,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub bcc_addresses: Vec<String>,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub processing_status: ProcessingStatus,
    pub category: Category,
    pub priority: Priority,
    pub sentiment: Sentiment,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub confidence: f32,
    pub importance_score: Option<i32>,
    pub priority_reasoning: Option<String>,
    pub scoring_breakdown: Option<Json>,
    pub schedule_execution_id: Option<i32>,
    pub entities: Vec<EntityUpsert>,
    pub actions: Vec<ActionUpsert>,
}

/// `advanceSchedule`'s per-`ProcessingType` outcome.
pub enum ScheduleAdvance {
    /// `DATE_RANGE` always disables the schedule on success.
    DateRangeDone {
        last_executed_at: DateTime<Utc>,
        emails_processed: i64,
    },
    Recurring {
        next_execution_at: DateTime<Utc>,
        last_executed_at: DateTime<Utc>,
        emails_processed: i64,
    },
    /// `next_execution_at: None` disables the schedule (no future date left).
    SpecificDates {
        next_execution_at: Option<DateTime<Utc>>,
        last_executed_at: DateTime<Utc>,
        emails_processed: i64,
    },
    /// A failed execution still records `lastExecutedAt` and recomputes the
    /// next firing normally; failures never skip subsequent firings.
    Failed {
        next_execution_at: Option<DateTime<Utc>>,
        last_executed_at: DateTime<Utc>,
    },
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_due_schedules(&self, now: DateTime<Utc>) -> AppResult<Vec<schedule::Model>>;
    async fn find_schedule(&self, id: i32) -> AppResult<Option<schedule::Model>>;
    async fn email_account(&self, id: i32) -> AppResult<Option<email_account::Model>>;

    /// Succeeds iff no lock row exists at `execution_time` (already
    /// truncated to the minute by the caller); cluster-wide mutual
    /// exclusion comes from a uniqueness constraint on that column.
    async fn try_acquire_execution_lock(
        &self,
        execution_time: DateTime<Utc>,
        schedule_ids: &[i32],
    ) -> AppResult<bool>;
    async fn release_execution_lock(&self, execution_time: DateTime<Utc>) -> AppResult<()>;
    /// Janitor pass: deletes locks older than `grace`, reclaiming them for
    /// a future tick.
    async fn reap_stale_locks(&self, grace: Duration, now: DateTime<Utc>) -> AppResult<u64>;

    async fn create_execution(
        &self,
        schedule_id: i32,
        max_attempts: i32,
    ) -> AppResult<schedule_execution::Model>;
    async fn update_execution_progress(
        &self,
        id: i32,
        progress: ExecutionProgress,
    ) -> AppResult<()>;
    async fn finish_execution(
        &self,
        id: i32,
        status: ExecutionStatus,
        outcome: ExecutionOutcome,
    ) -> AppResult<()>;
    /// Reaps `RUNNING` executions older than `staleness`, marking them
    /// `FAILED` so a crashed worker doesn't wedge a schedule forever.
    async fn reap_stale_executions(&self, staleness: Duration, now: DateTime<Utc>) -> AppResult<u64>;
    async fn last_successful_execution(
        &self,
        schedule_id: i32,
    ) -> AppResult<Option<schedule_execution::Model>>;

    /// Sets (or re-sets) `processing_status = PROCESSING` before the LLM
    /// call, so a crash mid-message is observable (see DESIGN.md).
    async fn mark_processing(
        &self,
        message_id: &str,
        email_account_id: i32,
        uid: i64,
        subject: Option<&str>,
        from_address: &str,
        to_addresses: &[String],
        cc_addresses: &[String],
        bcc_addresses: &[String],
        received_at: DateTime<Utc>,
        body_text: Option<&str>,
        body_html: Option<&str>,
    ) -> AppResult<()>;

    /// Create-or-replace keyed on `message_id`. A `COMPLETED` row is never
    /// overwritten; children (entities, action items) are deleted and
    /// recreated in the same transaction as the parent write.
    async fn upsert_processed_email(
        &self,
        desired: ProcessedEmailUpsert,
    ) -> AppResult<processed_email::Model>;
    async fn find_processed_status(&self, message_id: &str) -> AppResult<Option<ProcessingStatus>>;
    async fn find_processed(&self, message_id: &str) -> AppResult<Option<processed_email::Model>>;
    async fn find_processed_by_message_ids(
        &self,
        ids: &[String],
    ) -> AppResult<HashSet<String>>;

    async fn advance_schedule(&self, schedule_id: i32, advance: ScheduleAdvance) -> AppResult<()>;

    async fn active_templates(&self) -> AppResult<Vec<prompt_template::Model>>;
}

/// `sea-orm`/Postgres implementation. No SQL lives outside this module;
/// the schema itself is defined by the `migration` crate.
pub struct SeaOrmRepository {
    conn: DatabaseConnection,
}

impl SeaOrmRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - chrono::Duration::nanoseconds(t.timestamp_subsec_nanos() as i64) - chrono::Duration::seconds(t.second() as i64)
}

use chrono::Timelike;

#[async_trait]
impl Repository for SeaOrmRepository {
    async fn load_due_schedules(&self, now: DateTime<Utc>) -> AppResult<Vec<schedule::Model>> {
        let schedules = Schedule::find()
            .filter(schedule::Column::IsEnabled.eq(true))
            .filter(schedule::Column::NextExecutionAt.lte(now))
            .all(&self.conn)
            .await?;
        Ok(schedules)
    }

    async fn find_schedule(&self, id: i32) -> AppResult<Option<schedule::Model>> {
        Ok(Schedule::find_by_id(id).one(&self.conn).await?)
    }

    async fn email_account(&self, id: i32) -> AppResult<Option<email_account::Model>> {
        Ok(EmailAccount::find_by_id(id).one(&self.conn).await?)
    }

    async fn try_acquire_execution_lock(
        &self,
        execution_time: DateTime<Utc>,
        schedule_ids: &[i32],
    ) -> AppResult<bool> {
        let execution_time = truncate_to_minute(execution_time);
        let model = entity::execution_lock::ActiveModel {
            execution_time: Set(execution_time.into()),
            schedule_ids: Set(serde_json::to_value(schedule_ids).unwrap_or_default()),
            acquired_at: Set(Utc::now().into()),
        };
        match ExecutionLock::insert(model).exec(&self.conn).await {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_execution_lock(&self, execution_time: DateTime<Utc>) -> AppResult<()> {
        let execution_time = truncate_to_minute(execution_time);
        ExecutionLock::delete_by_id(sea_orm::prelude::DateTimeWithTimeZone::from(execution_time))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn reap_stale_locks(&self, grace: Duration, now: DateTime<Utc>) -> AppResult<u64> {
        let cutoff = now - chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::minutes(10));
        let res = ExecutionLock::delete_many()
            .filter(entity::execution_lock::Column::AcquiredAt.lt(cutoff))
            .exec(&self.conn)
            .await?;
        Ok(res.rows_affected)
    }

    async fn create_execution(
        &self,
        schedule_id: i32,
        max_attempts: i32,
    ) -> AppResult<schedule_execution::Model> {
        let now = Utc::now();
        let model = schedule_execution::ActiveModel {
            id: NotSet,
            schedule_id: Set(schedule_id),
            status: Set(ExecutionStatus::Running),
            started_at: Set(now.into()),
            completed_at: Set(None),
            max_attempts: Set(max_attempts),
            total_batches_count: Set(0),
            completed_batches_count: Set(0),
            total_emails_count: Set(0),
            processed_emails_count: Set(0),
            failed_emails_count: Set(0),
            processing_duration_ms: Set(None),
            error_message: Set(None),
            error_details: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(ScheduleExecution::insert(model)
            .exec_with_returning(&self.conn)
            .await?)
    }

    async fn update_execution_progress(&self, id: i32, progress: ExecutionProgress) -> AppResult<()> {
        let txn = self.conn.begin().await?;
        let existing = ScheduleExecution::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("execution {id} not found")))?;
        let mut am: schedule_execution::ActiveModel = existing.into();
        am.total_batches_count = Set(progress.total_batches_count);
        am.completed_batches_count = Set(progress.completed_batches_count);
        am.total_emails_count = Set(progress.total_emails_count);
        am.processed_emails_count = Set(progress.processed_emails_count);
        am.failed_emails_count = Set(progress.failed_emails_count);
        am.updated_at = Set(Utc::now().into());
        am.update(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn finish_execution(
        &self,
        id: i32,
        status: ExecutionStatus,
        outcome: ExecutionOutcome,
    ) -> AppResult<()> {
        let existing = ScheduleExecution::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("execution {id} not found")))?;
        let mut am: schedule_execution::ActiveModel = existing.into();
        am.status = Set(status);
        am.completed_at = Set(Some(Utc::now().into()));
        am.processing_duration_ms = Set(outcome.processing_duration_ms);
        am.error_message = Set(outcome.error_message);
        am.error_details = Set(outcome.error_details);
        am.updated_at = Set(Utc::now().into());
        am.update(&self.conn).await?;
        Ok(())
    }

    async fn reap_stale_executions(&self, staleness: Duration, now: DateTime<Utc>) -> AppResult<u64> {
        let cutoff = now - chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::hours(1));
        let stale = ScheduleExecution::find()
            .filter(schedule_execution::Column::Status.eq(ExecutionStatus::Running))
            .filter(schedule_execution::Column::StartedAt.lt(cutoff))
            .all(&self.conn)
            .await?;
        let count = stale.len() as u64;
        for exec in stale {
            let id = exec.id;
            let mut am: schedule_execution::ActiveModel = exec.into();
            am.status = Set(ExecutionStatus::Failed);
            am.completed_at = Set(Some(now.into()));
            am.error_message = Set(Some("reaped: execution exceeded staleness threshold".to_string()));
            am.updated_at = Set(now.into());
            am.update(&self.conn).await.map_err(AppError::from)?;
            tracing::warn!(execution_id = id, "reaped stale running execution");
        }
        Ok(count)
    }

    async fn last_successful_execution(
        &self,
        schedule_id: i32,
    ) -> AppResult<Option<schedule_execution::Model>> {
        use sea_orm::QueryOrder;
        let exec = ScheduleExecution::find()
            .filter(schedule_execution::Column::ScheduleId.eq(schedule_id))
            .filter(schedule_execution::Column::Status.eq(ExecutionStatus::Completed))
            .order_by_desc(schedule_execution::Column::CompletedAt)
            .one(&self.conn)
            .await?;
        Ok(exec)
    }

    #[allow(clippy::too_many_arguments)]
    async fn mark_processing(
        &self,
        message_id: &str,
        email_account_id: i32,
        uid: i64,
        subject: Option<&str>,
        from_address: &str,
        to_addresses: &[String],
        cc_addresses: &[String],
        bcc_addresses: &[String],
        received_at: DateTime<Utc>,
        body_text: Option<&str>,
        body_html: Option<&str>,
    ) -> AppResult<()> {
        let existing = ProcessedEmail::find_by_id(message_id.to_string())
            .one(&self.conn)
            .await?;
        if let Some(existing) = &existing {
            if existing.processing_status == ProcessingStatus::Completed {
                return Ok(());
            }
        }

        let now = Utc::now();
        let model = processed_email::ActiveModel {
            message_id: Set(message_id.to_string()),
            email_account_id: Set(email_account_id),
            uid: Set(uid),
            subject: Set(subject.map(str::to_string)),
            from_address: Set(from_address.to_string()),
            to_addresses: Set(serde_json::to_value(to_addresses).unwrap_or_default()),
            cc_addresses: Set(serde_json::to_value(cc_addresses).unwrap_or_default()),
            bcc_addresses: Set(serde_json::to_value(bcc_addresses).unwrap_or_default()),
            received_at: Set(received_at.into()),
            body_text: Set(body_text.map(str::to_string)),
            body_html: Set(body_html.map(str::to_string)),
            processing_status: Set(ProcessingStatus::Processing),
            category: Set(Category::Personal),
            priority: Set(Priority::Medium),
            sentiment: Set(Sentiment::Neutral),
            summary: Set(None),
            tags: Set(serde_json::to_value(Vec::<String>::new()).unwrap()),
            confidence: Set(0.0),
            importance_score: Set(None),
            priority_reasoning: Set(None),
            scoring_breakdown: Set(None),
            schedule_execution_id: Set(None),
            created_at: Set(existing.map(|e| e.created_at).unwrap_or(now.into())),
            updated_at: Set(now.into()),
        };

        ProcessedEmail::insert(model)
            .on_conflict(
                OnConflict::column(processed_email::Column::MessageId)
                    .update_columns([
                        processed_email::Column::ProcessingStatus,
                        processed_email::Column::Subject,
                        processed_email::Column::FromAddress,
                        processed_email::Column::ToAddresses,
                        processed_email::Column::CcAddresses,
                        processed_email::Column::BccAddresses,
                        processed_email::Column::ReceivedAt,
                        processed_email::Column::BodyText,
                        processed_email::Column::BodyHtml,
                        processed_email::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_processed_email(
        &self,
        desired: ProcessedEmailUpsert,
    ) -> AppResult<processed_email::Model> {
        let txn = self.conn.begin().await?;

        let existing = ProcessedEmail::find_by_id(desired.message_id.clone())
            .one(&txn)
            .await?;
        if let Some(existing) = &existing {
            if existing.processing_status == ProcessingStatus::Completed {
                // Immutable: a COMPLETED record is never overwritten.
                txn.commit().await?;
                return Ok(existing.clone());
            }
        }

        EntityExtraction::delete_many()
            .filter(entity_extraction::Column::ProcessedEmailId.eq(desired.message_id.clone()))
            .exec(&txn)
            .await?;
        ActionItem::delete_many()
            .filter(action_item::Column::ProcessedEmailId.eq(desired.message_id.clone()))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let model = processed_email::ActiveModel {
            message_id: Set(desired.message_id.clone()),
            email_account_id: Set(desired.email_account_id),
            uid: Set(desired.uid),
            subject: Set(desired.subject),
            from_address: Set(desired.from_address),
            to_addresses: Set(serde_json::to_value(&desired.to_addresses).unwrap_or_default()),
            cc_addresses: Set(serde_json::to_value(&desired.cc_addresses).unwrap_or_default()),
            bcc_addresses: Set(serde_json::to_value(&desired.bcc_addresses).unwrap_or_default()),
            received_at: Set(desired.received_at.into()),
            body_text: Set(desired.body_text),
            body_html: Set(desired.body_html),
            processing_status: Set(desired.processing_status),
            category: Set(desired.category),
            priority: Set(desired.priority),
            sentiment: Set(desired.sentiment),
            summary: Set(desired.summary),
            tags: Set(serde_json::to_value(&desired.tags).unwrap_or_default()),
            confidence: Set(desired.confidence),
            importance_score: Set(desired.importance_score),
            priority_reasoning: Set(desired.priority_reasoning),
            scoring_breakdown: Set(desired.scoring_breakdown),
            schedule_execution_id: Set(desired.schedule_execution_id),
            created_at: Set(existing.map(|e| e.created_at).unwrap_or(now.into())),
            updated_at: Set(now.into()),
        };

        ProcessedEmail::insert(model)
            .on_conflict(
                OnConflict::column(processed_email::Column::MessageId)
                    .update_columns([
                        processed_email::Column::EmailAccountId,
                        processed_email::Column::Uid,
                        processed_email::Column::Subject,
                        processed_email::Column::FromAddress,
                        processed_email::Column::ToAddresses,
                        processed_email::Column::CcAddresses,
                        processed_email::Column::BccAddresses,
                        processed_email::Column::ReceivedAt,
                        processed_email::Column::BodyText,
                        processed_email::Column::BodyHtml,
                        processed_email::Column::ProcessingStatus,
                        processed_email::Column::Category,
                        processed_email::Column::Priority,
                        processed_email::Column::Sentiment,
                        processed_email::Column::Summary,
                        processed_email::Column::Tags,
                        processed_email::Column::Confidence,
                        processed_email::Column::ImportanceScore,
                        processed_email::Column::PriorityReasoning,
                        processed_email::Column::ScoringBreakdown,
                        processed_email::Column::ScheduleExecutionId,
                        processed_email::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&txn)
            .await?;

        if !desired.entities.is_empty() {
            let models = desired.entities.into_iter().map(|e| entity_extraction::ActiveModel {
                id: NotSet,
                processed_email_id: Set(desired.message_id.clone()),
                entity_type: Set(e.entity_type),
                entity_value: Set(e.entity_value),
                confidence: Set(e.confidence),
                context: Set(e.context),
            });
            EntityExtraction::insert_many(models).exec(&txn).await?;
        }

        if !desired.actions.is_empty() {
            let models = desired.actions.into_iter().map(|a| action_item::ActiveModel {
                id: NotSet,
                processed_email_id: Set(desired.message_id.clone()),
                action_type: Set(a.action_type),
                description: Set(a.description),
                priority: Set(a.priority),
                due_date: Set(a.due_date.map(Into::into)),
                is_completed: Set(a.is_completed),
            });
            ActionItem::insert_many(models).exec(&txn).await?;
        }

        let saved = ProcessedEmail::find_by_id(desired.message_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::Fatal("processed_email vanished after upsert".to_string()))?;

        txn.commit().await?;
        Ok(saved)
    }

    async fn find_processed_status(&self, message_id: &str) -> AppResult<Option<ProcessingStatus>> {
        let found = ProcessedEmail::find_by_id(message_id.to_string())
            .one(&self.conn)
            .await?;
        Ok(found.map(|m| m.processing_status))
    }

    async fn find_processed(&self, message_id: &str) -> AppResult<Option<processed_email::Model>> {
        Ok(ProcessedEmail::find_by_id(message_id.to_string())
            .one(&self.conn)
            .await?)
    }

    async fn find_processed_by_message_ids(&self, ids: &[String]) -> AppResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found = ProcessedEmail::find()
            .filter(processed_email::Column::MessageId.is_in(ids.to_vec()))
            .filter(processed_email::Column::ProcessingStatus.eq(ProcessingStatus::Completed))
            .all(&self.conn)
            .await?;
        Ok(found.into_iter().map(|m| m.message_id).collect())
    }

    async fn advance_schedule(&self, schedule_id: i32, advance: ScheduleAdvance) -> AppResult<()> {
        let existing = Schedule::find_by_id(schedule_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("schedule {schedule_id} not found")))?;
        let mut am: schedule::ActiveModel = existing.clone().into();
        match advance {
            ScheduleAdvance::DateRangeDone {
                last_executed_at,
                emails_processed,
            } => {
                am.is_enabled = Set(false);
                am.next_execution_at = Set(None);
                am.last_executed_at = Set(Some(last_executed_at.into()));
                am.total_executions = Set(existing.total_executions + 1);
                am.total_emails_processed = Set(existing.total_emails_processed + emails_processed);
            }
            ScheduleAdvance::Recurring {
                next_execution_at,
                last_executed_at,
                emails_processed,
            } => {
                am.next_execution_at = Set(Some(next_execution_at.into()));
                am.last_executed_at = Set(Some(last_executed_at.into()));
                am.total_executions = Set(existing.total_executions + 1);
                am.total_emails_processed = Set(existing.total_emails_processed + emails_processed);
            }
            ScheduleAdvance::SpecificDates {
                next_execution_at,
                last_executed_at,
                emails_processed,
            } => {
                am.is_enabled = Set(next_execution_at.is_some());
                am.next_execution_at = Set(next_execution_at.map(Into::into));
                am.last_executed_at = Set(Some(last_executed_at.into()));
                am.total_executions = Set(existing.total_executions + 1);
                am.total_emails_processed = Set(existing.total_emails_processed + emails_processed);
            }
            ScheduleAdvance::Failed {
                next_execution_at,
                last_executed_at,
            } => {
                am.next_execution_at = Set(next_execution_at.map(Into::into));
                am.last_executed_at = Set(Some(last_executed_at.into()));
                am.total_executions = Set(existing.total_executions + 1);
            }
        }
        am.updated_at = Set(Utc::now().into());
        am.update(&self.conn).await?;
        Ok(())
    }

    async fn active_templates(&self) -> AppResult<Vec<prompt_template::Model>> {
        let templates = PromptTemplate::find()
            .filter(prompt_template::Column::IsActive.eq(true))
            .all(&self.conn)
            .await?;
        Ok(templates)
    }
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    match err.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => true,
        _ => false,
    }
}

/// Ensures the `InMemoryRepository` test fake compiles against the same
/// `Repository` trait every production caller does, catching drift between
/// the fake and the real implementation at the type level.
#[allow(dead_code)]
fn _assert_seaorm_repository_is_repository() {
    fn assert_impl<T: Repository>() {}
    assert_impl::<SeaOrmRepository>();
}

#[cfg(any(test, feature = "test-fakes"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Hand-rolled in-memory `Repository` for pipeline/orchestrator/scheduler
    /// unit tests, in place of `sea_orm::MockDatabase` — a plain struct is
    /// clearer for the read-modify-write sequences these tests drive.
    #[derive(Default)]
    pub struct InMemoryRepository {
        inner: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        schedules: HashMap<i32, schedule::Model>,
        email_accounts: HashMap<i32, email_account::Model>,
        locks: HashMap<DateTime<Utc>, DateTime<Utc>>,
        executions: HashMap<i32, schedule_execution::Model>,
        next_execution_id: i32,
        processed: HashMap<String, processed_email::Model>,
        entities: HashMap<String, Vec<entity_extraction::Model>>,
        actions: HashMap<String, Vec<action_item::Model>>,
        templates: Vec<prompt_template::Model>,
    }

    impl InMemoryRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_schedule(&self, schedule: schedule::Model) {
            self.inner.lock().await.schedules.insert(schedule.id, schedule);
        }

        pub async fn insert_email_account(&self, account: email_account::Model) {
            self.inner.lock().await.email_accounts.insert(account.id, account);
        }

        pub async fn insert_template(&self, template: prompt_template::Model) {
            self.inner.lock().await.templates.push(template);
        }

        pub async fn get_schedule(&self, id: i32) -> Option<schedule::Model> {
            self.inner.lock().await.schedules.get(&id).cloned()
        }

        pub async fn get_execution(&self, id: i32) -> Option<schedule_execution::Model> {
            self.inner.lock().await.executions.get(&id).cloned()
        }

        pub async fn get_processed(&self, message_id: &str) -> Option<processed_email::Model> {
            self.inner.lock().await.processed.get(message_id).cloned()
        }

        pub async fn entities_for(&self, message_id: &str) -> Vec<entity_extraction::Model> {
            self.inner
                .lock()
                .await
                .entities
                .get(message_id)
                .cloned()
                .unwrap_or_default()
        }

        pub async fn actions_for(&self, message_id: &str) -> Vec<action_item::Model> {
            self.inner
                .lock()
                .await
                .actions
                .get(message_id)
                .cloned()
                .unwrap_or_default()
        }

        pub async fn lock_count(&self) -> usize {
            self.inner.lock().await.locks.len()
        }
    }

    #[async_trait]
    impl Repository for InMemoryRepository {
        async fn load_due_schedules(&self, now: DateTime<Utc>) -> AppResult<Vec<schedule::Model>> {
            let state = self.inner.lock().await;
            Ok(state
                .schedules
                .values()
                .filter(|s| {
                    s.is_enabled
                        && s.next_execution_at
                            .map(|t| t.with_timezone(&Utc) <= now)
                            .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn find_schedule(&self, id: i32) -> AppResult<Option<schedule::Model>> {
            Ok(self.inner.lock().await.schedules.get(&id).cloned())
        }

        async fn email_account(&self, id: i32) -> AppResult<Option<email_account::Model>> {
            Ok(self.inner.lock().await.email_accounts.get(&id).cloned())
        }

        async fn try_acquire_execution_lock(
            &self,
            execution_time: DateTime<Utc>,
            _schedule_ids: &[i32],
        ) -> AppResult<bool> {
            let execution_time = truncate_to_minute(execution_time);
            let mut state = self.inner.lock().await;
            if state.locks.contains_key(&execution_time) {
                return Ok(false);
            }
            state.locks.insert(execution_time, Utc::now());
            Ok(true)
        }

        async fn release_execution_lock(&self, execution_time: DateTime<Utc>) -> AppResult<()> {
            let execution_time = truncate_to_minute(execution_time);
            self.inner.lock().await.locks.remove(&execution_time);
            Ok(())
        }

        async fn reap_stale_locks(&self, grace: Duration, now: DateTime<Utc>) -> AppResult<u64> {
            let cutoff = now - chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::minutes(10));
            let mut state = self.inner.lock().await;
            let before = state.locks.len();
            state.locks.retain(|_, acquired_at| *acquired_at >= cutoff);
            Ok((before - state.locks.len()) as u64)
        }

        async fn create_execution(
            &self,
            schedule_id: i32,
            max_attempts: i32,
        ) -> AppResult<schedule_execution::Model> {
            let mut state = self.inner.lock().await;
            state.next_execution_id += 1;
            let id = state.next_execution_id;
            let now = Utc::now();
            let model = schedule_execution::Model {
                id,
                schedule_id,
                status: ExecutionStatus::Running,
                started_at: now.into(),
                completed_at: None,
                max_attempts,
                total_batches_count: 0,
                completed_batches_count: 0,
                total_emails_count: 0,
                processed_emails_count: 0,
                failed_emails_count: 0,
                processing_duration_ms: None,
                error_message: None,
                error_details: None,
                created_at: now.into(),
                updated_at: now.into(),
            };
            state.executions.insert(id, model.clone());
            Ok(model)
        }

        async fn update_execution_progress(&self, id: i32, progress: ExecutionProgress) -> AppResult<()> {
            let mut state = self.inner.lock().await;
            let exec = state
                .executions
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("execution {id} not found")))?;
            exec.total_batches_count = progress.total_batches_count;
            exec.completed_batches_count = progress.completed_batches_count;
            exec.total_emails_count = progress.total_emails_count;
            exec.processed_emails_count = progress.processed_emails_count;
            exec.failed_emails_count = progress.failed_emails_count;
            exec.updated_at = Utc::now().into();
            Ok(())
        }

        async fn finish_execution(
            &self,
            id: i32,
            status: ExecutionStatus,
            outcome: ExecutionOutcome,
        ) -> AppResult<()> {
            let mut state = self.inner.lock().await;
            let exec = state
                .executions
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("execution {id} not found")))?;
            exec.status = status;
            exec.completed_at = Some(Utc::now().into());
            exec.processing_duration_ms = outcome.processing_duration_ms;
            exec.error_message = outcome.error_message;
            exec.error_details = outcome.error_details;
            Ok(())
        }

        async fn reap_stale_executions(&self, staleness: Duration, now: DateTime<Utc>) -> AppResult<u64> {
            let cutoff = now - chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::hours(1));
            let mut state = self.inner.lock().await;
            let mut count = 0;
            for exec in state.executions.values_mut() {
                if exec.status == ExecutionStatus::Running && exec.started_at.with_timezone(&Utc) < cutoff {
                    exec.status = ExecutionStatus::Failed;
                    exec.completed_at = Some(now.into());
                    exec.error_message = Some("reaped: execution exceeded staleness threshold".to_string());
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn last_successful_execution(
            &self,
            schedule_id: i32,
        ) -> AppResult<Option<schedule_execution::Model>> {
            let state = self.inner.lock().await;
            Ok(state
                .executions
                .values()
                .filter(|e| e.schedule_id == schedule_id && e.status == ExecutionStatus::Completed)
                .max_by_key(|e| e.completed_at)
                .cloned())
        }

        #[allow(clippy::too_many_arguments)]
        async fn mark_processing(
            &self,
            message_id: &str,
            email_account_id: i32,
            uid: i64,
            subject: Option<&str>,
            from_address: &str,
            to_addresses: &[String],
            cc_addresses: &[String],
            bcc_addresses: &[String],
            received_at: DateTime<Utc>,
            body_text: Option<&str>,
            body_html: Option<&str>,
        ) -> AppResult<()> {
            let mut state = self.inner.lock().await;
            if let Some(existing) = state.processed.get(message_id) {
                if existing.processing_status == ProcessingStatus::Completed {
                    return Ok(());
                }
            }
            let now = Utc::now();
            let created_at = state
                .processed
                .get(message_id)
                .map(|m| m.created_at)
                .unwrap_or(now.into());
            state.processed.insert(
                message_id.to_string(),
                processed_email::Model {
                    message_id: message_id.to_string(),
                    email_account_id,
                    uid,
                    subject: subject.map(str::to_string),
                    from_address: from_address.to_string(),
                    to_addresses: serde_json::to_value(to_addresses).unwrap_or_default(),
                    cc_addresses: serde_json::to_value(cc_addresses).unwrap_or_default(),
                    bcc_addresses: serde_json::to_value(bcc_addresses).unwrap_or_default(),
                    received_at: received_at.into(),
                    body_text: body_text.map(str::to_string),
                    body_html: body_html.map(str::to_string),
                    processing_status: ProcessingStatus::Processing,
                    category: Category::Personal,
                    priority: Priority::Medium,
                    sentiment: Sentiment::Neutral,
                    summary: None,
                    tags: serde_json::to_value(Vec::<String>::new()).unwrap(),
                    confidence: 0.0,
                    importance_score: None,
                    priority_reasoning: None,
                    scoring_breakdown: None,
                    schedule_execution_id: None,
                    created_at,
                    updated_at: now.into(),
                },
            );
            Ok(())
        }

        async fn upsert_processed_email(
            &self,
            desired: ProcessedEmailUpsert,
        ) -> AppResult<processed_email::Model> {
            let mut state = self.inner.lock().await;
            if let Some(existing) = state.processed.get(&desired.message_id) {
                if existing.processing_status == ProcessingStatus::Completed {
                    return Ok(existing.clone());
                }
            }

            let now = Utc::now();
            let created_at = state
                .processed
                .get(&desired.message_id)
                .map(|m| m.created_at)
                .unwrap_or(now.into());

            let model = processed_email::Model {
                message_id: desired.message_id.clone(),
                email_account_id: desired.email_account_id,
                uid: desired.uid,
                subject: desired.subject,
                from_address: desired.from_address,
                to_addresses: serde_json::to_value(&desired.to_addresses).unwrap_or_default(),
                cc_addresses: serde_json::to_value(&desired.cc_addresses).unwrap_or_default(),
                bcc_addresses: serde_json::to_value(&desired.bcc_addresses).unwrap_or_default(),
                received_at: desired.received_at.into(),
                body_text: desired.body_text,
                body_html: desired.body_html,
                processing_status: desired.processing_status,
                category: desired.category,
                priority: desired.priority,
                sentiment: desired.sentiment,
                summary: desired.summary,
                tags: serde_json::to_value(&desired.tags).unwrap_or_default(),
                confidence: desired.confidence,
                importance_score: desired.importance_score,
                priority_reasoning: desired.priority_reasoning,
                scoring_breakdown: desired.scoring_breakdown,
                schedule_execution_id: desired.schedule_execution_id,
                created_at,
                updated_at: now.into(),
            };

            state.processed.insert(desired.message_id.clone(), model.clone());

            let entities = desired
                .entities
                .into_iter()
                .enumerate()
                .map(|(i, e)| entity_extraction::Model {
                    id: i as i32,
                    processed_email_id: desired.message_id.clone(),
                    entity_type: e.entity_type,
                    entity_value: e.entity_value,
                    confidence: e.confidence,
                    context: e.context,
                })
                .collect();
            state.entities.insert(desired.message_id.clone(), entities);

            let actions = desired
                .actions
                .into_iter()
                .enumerate()
                .map(|(i, a)| action_item::Model {
                    id: i as i32,
                    processed_email_id: desired.message_id.clone(),
                    action_type: a.action_type,
                    description: a.description,
                    priority: a.priority,
                    due_date: a.due_date.map(Into::into),
                    is_completed: a.is_completed,
                })
                .collect();
            state.actions.insert(desired.message_id.clone(), actions);

            Ok(model)
        }

        async fn find_processed_status(&self, message_id: &str) -> AppResult<Option<ProcessingStatus>> {
            Ok(self
                .inner
                .lock()
                .await
                .processed
                .get(message_id)
                .map(|m| m.processing_status))
        }

        async fn find_processed(&self, message_id: &str) -> AppResult<Option<processed_email::Model>> {
            Ok(self.inner.lock().await.processed.get(message_id).cloned())
        }

        async fn find_processed_by_message_ids(&self, ids: &[String]) -> AppResult<HashSet<String>> {
            let state = self.inner.lock().await;
            Ok(ids
                .iter()
                .filter(|id| {
                    state
                        .processed
                        .get(*id)
                        .map(|m| m.processing_status == ProcessingStatus::Completed)
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn advance_schedule(&self, schedule_id: i32, advance: ScheduleAdvance) -> AppResult<()> {
            let mut state = self.inner.lock().await;
            let sched = state
                .schedules
                .get_mut(&schedule_id)
                .ok_or_else(|| AppError::NotFound(format!("schedule {schedule_id} not found")))?;
            match advance {
                ScheduleAdvance::DateRangeDone {
                    last_executed_at,
                    emails_processed,
                } => {
                    sched.is_enabled = false;
                    sched.next_execution_at = None;
                    sched.last_executed_at = Some(last_executed_at.into());
                    sched.total_executions += 1;
                    sched.total_emails_processed += emails_processed;
                }
                ScheduleAdvance::Recurring {
                    next_execution_at,
                    last_executed_at,
                    emails_processed,
                } => {
                    sched.next_execution_at = Some(next_execution_at.into());
                    sched.last_executed_at = Some(last_executed_at.into());
                    sched.total_executions += 1;
                    sched.total_emails_processed += emails_processed;
                }
                ScheduleAdvance::SpecificDates {
                    next_execution_at,
                    last_executed_at,
                    emails_processed,
                } => {
                    sched.is_enabled = next_execution_at.is_some();
                    sched.next_execution_at = next_execution_at.map(Into::into);
                    sched.last_executed_at = Some(last_executed_at.into());
                    sched.total_executions += 1;
                    sched.total_emails_processed += emails_processed;
                }
                ScheduleAdvance::Failed {
                    next_execution_at,
                    last_executed_at,
                } => {
                    sched.next_execution_at = next_execution_at.map(Into::into);
                    sched.last_executed_at = Some(last_executed_at.into());
                    sched.total_executions += 1;
                }
            }
            Ok(())
        }

        async fn active_templates(&self) -> AppResult<Vec<prompt_template::Model>> {
            Ok(self
                .inner
                .lock()
                .await
                .templates
                .iter()
                .filter(|t| t.is_active)
                .cloned()
                .collect())
        }
    }
}
