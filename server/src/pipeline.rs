//! Per-message analysis pipeline (spec.md §4.7): dedupe → template select →
//! render → LLM → parse → priority post-processing → upsert. A message's
//! outcome is always captured as data (`EmailProcessingResult`), never as a
//! propagated `AppError` — only the batch/execution layer above raises.

use std::sync::Arc;

use entity::schedule;
use entity::sea_orm_active_enums::ProcessingStatus;
use lib_mail::CanonicalMessage;

use crate::embedding::EmbeddingClassifier;
use crate::llm::{ChatRequest, LlmClient};
use crate::priority::{self, PriorityHints};
use crate::repository::{ActionUpsert, EntityUpsert, ProcessedEmailUpsert, Repository};
use crate::server_config::cfg;
use crate::template::{self, parse::parse_and_validate, parse::Parsed, render::render_prompt, render::RenderInputs};

/// Outcome of running one message through the pipeline. Never an `Err`:
/// per-message failure is a value, not a propagated error (spec.md §7).
#[derive(Debug, Clone)]
pub enum EmailProcessingResult {
    Success {
        message_id: String,
        already_completed: bool,
    },
    Failure {
        message_id: String,
        error: String,
    },
}

impl EmailProcessingResult {
    pub fn message_id(&self) -> &str {
        match self {
            EmailProcessingResult::Success { message_id, .. } => message_id,
            EmailProcessingResult::Failure { message_id, .. } => message_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EmailProcessingResult::Success { .. })
    }
}

pub struct AnalysisPipeline {
    repository: Arc<dyn Repository>,
    llm_client: Arc<dyn LlmClient>,
    embedding_classifier: Arc<dyn EmbeddingClassifier>,
}

impl AnalysisPipeline {
    pub fn new(
        repository: Arc<dyn Repository>,
        llm_client: Arc<dyn LlmClient>,
        embedding_classifier: Arc<dyn EmbeddingClassifier>,
    ) -> Self {
        Self {
            repository,
            llm_client,
            embedding_classifier,
        }
    }

    /// Runs one message through the full pipeline. `execution_id` is `None`
    /// only for ad-hoc out-of-schedule invocations (e.g. a future manual
    /// "reprocess" CLI path); the normal orchestrator-driven path always
    /// supplies one.
    pub async fn process_message(
        &self,
        account_id: i32,
        email: &CanonicalMessage,
        schedule: &schedule::Model,
        execution_id: Option<i32>,
    ) -> EmailProcessingResult {
        let message_id = email.message_id.clone();

        // Step 1: idempotency probe.
        match self.repository.find_processed_status(&message_id).await {
            Ok(Some(ProcessingStatus::Completed)) => {
                tracing::debug!(message_id = %message_id, "already completed, skipping LLM");
                return EmailProcessingResult::Success {
                    message_id,
                    already_completed: true,
                };
            }
            Ok(Some(ProcessingStatus::Failed)) => {
                tracing::debug!(message_id = %message_id, "retrying previously failed message");
            }
            Ok(_) => {}
            Err(e) => {
                return EmailProcessingResult::Failure {
                    message_id,
                    error: format!("idempotency probe failed: {e}"),
                }
            }
        }

        let subject = email.subject.as_deref().unwrap_or_default();
        let body_text = email
            .body_text
            .as_deref()
            .or(email.body_html.as_deref())
            .unwrap_or_default();

        let hints = priority::pre_llm_hints(
            &schedule.sender_priorities,
            &schedule.email_type_priorities,
            &email.from,
            subject,
            body_text,
        );

        if let Err(e) = self.mark_processing(account_id, email).await {
            return EmailProcessingResult::Failure {
                message_id,
                error: format!("failed to mark processing: {e}"),
            };
        }

        // Step 2: template selection.
        let candidates = match self.repository.active_templates().await {
            Ok(c) => c,
            Err(e) => {
                return self
                    .fail_with_defaults(account_id, email, execution_id, &hints, format!("loading templates failed: {e}"))
                    .await
            }
        };

        let Some(chosen_template) = template::select_template(
            email,
            Some(&schedule.llm_focus),
            self.embedding_classifier.as_ref(),
            &candidates,
            cfg.embedding_min_confidence,
        )
        .await
        else {
            return self
                .fail_with_defaults(
                    account_id,
                    email,
                    execution_id,
                    &hints,
                    "no active prompt templates available".to_string(),
                )
                .await;
        };

        // Step 3: prompt rendering.
        let render_inputs = RenderInputs {
            sender_priority: hints.sender_priority,
            type_priority: hints.type_priority,
            llm_focus: Some(&schedule.llm_focus),
        };
        let prompt = match render_prompt(&chosen_template.template, email, &render_inputs) {
            Ok(p) => p,
            Err(e) => {
                return self
                    .upsert_outcome(account_id, email, execution_id, &hints, Parsed::fallback())
                    .await
                    .unwrap_or_else(|err| EmailProcessingResult::Failure {
                        message_id: email.message_id.clone(),
                        error: format!("render failed ({e}) and fallback upsert also failed: {err}"),
                    })
            }
        };

        // Step 4: LLM call, 60s-per-message default timeout.
        let chat_result = tokio::time::timeout(
            cfg.llm_per_message_timeout,
            self.llm_client.execute_chat(ChatRequest {
                prompt,
                model: cfg.llm_default_model.clone(),
                temperature: cfg.llm_temperature,
            }),
        )
        .await;

        let parsed = match chat_result {
            Ok(Ok(response)) => parse_and_validate(&response.response),
            Ok(Err(e)) => {
                tracing::warn!(message_id = %message_id, "LLM call failed: {e}");
                Parsed::fallback()
            }
            Err(_) => {
                tracing::warn!(message_id = %message_id, "LLM call timed out");
                Parsed::fallback()
            }
        };

        self.upsert_outcome(account_id, email, execution_id, &hints, parsed)
            .await
            .unwrap_or_else(|e| EmailProcessingResult::Failure {
                message_id: email.message_id.clone(),
                error: e,
            })
    }

    async fn mark_processing(&self, account_id: i32, email: &CanonicalMessage) -> crate::error::AppResult<()> {
        self.repository
            .mark_processing(
                &email.message_id,
                account_id,
                email.uid as i64,
                email.subject.as_deref(),
                &email.from,
                &email.to,
                &email.cc,
                &email.bcc,
                email.date,
                email.body_text.as_deref(),
                email.body_html.as_deref(),
            )
            .await
    }

    /// Used when a precondition prevents even attempting the LLM (no
    /// templates, template lookup failed): goes straight to the same safe
    /// defaults `parseAndValidate` would have produced, marking the message
    /// `FAILED` rather than `COMPLETED`.
    async fn fail_with_defaults(
        &self,
        account_id: i32,
        email: &CanonicalMessage,
        execution_id: Option<i32>,
        hints: &PriorityHints,
        reason: String,
    ) -> EmailProcessingResult {
        tracing::warn!(message_id = %email.message_id, "{reason}");
        self.upsert_outcome(account_id, email, execution_id, hints, Parsed::fallback())
            .await
            .unwrap_or_else(|e| EmailProcessingResult::Failure {
                message_id: email.message_id.clone(),
                error: format!("{reason}; fallback upsert also failed: {e}"),
            })
    }

    /// Step 6 (priority post-processing) + step 7 (upsert) + step 8
    /// (outcome). `parsed.is_fallback` decides `COMPLETED` vs `FAILED`: a
    /// structurally valid response with a dropped field is still a success,
    /// a wholly unparseable one (or an LLM call that never returned) is not.
    async fn upsert_outcome(
        &self,
        account_id: i32,
        email: &CanonicalMessage,
        execution_id: Option<i32>,
        hints: &PriorityHints,
        parsed: Parsed,
    ) -> Result<EmailProcessingResult, String> {
        let scored = priority::apply_post_llm_boosts(parsed.importance_score, hints);

        let status = if parsed.is_fallback {
            ProcessingStatus::Failed
        } else {
            ProcessingStatus::Completed
        };

        let entities = parsed
            .entities
            .into_iter()
            .map(|e| EntityUpsert {
                entity_type: e.entity_type,
                entity_value: e.entity_value,
                confidence: e.confidence,
                context: e.context,
            })
            .collect();

        let actions = parsed
            .action_items
            .into_iter()
            .map(|a| ActionUpsert {
                action_type: a.action_type,
                description: a.description,
                priority: a.priority,
                due_date: a.due_date,
                is_completed: a.is_completed,
            })
            .collect();

        let desired = ProcessedEmailUpsert {
            message_id: email.message_id.clone(),
            email_account_id: account_id,
            uid: email.uid as i64,
            subject: email.subject.clone(),
            from_address: email.from.clone(),
            to_addresses: email.to.clone(),
            cc_addresses: email.cc.clone(),
            bcc_addresses: email.bcc.clone(),
            received_at: email.date,
            body_text: email.body_text.clone(),
            body_html: email.body_html.clone(),
            processing_status: status,
            category: parsed.category,
            priority: parsed.priority,
            sentiment: parsed.sentiment,
            summary: parsed.summary,
            tags: parsed.tags,
            confidence: parsed.confidence,
            importance_score: Some(scored.importance_score),
            priority_reasoning: scored.reasoning,
            scoring_breakdown: parsed.scoring_breakdown,
            schedule_execution_id: execution_id,
            entities,
            actions,
        };

        match self.repository.upsert_processed_email(desired).await {
            Ok(_) if status == ProcessingStatus::Completed => Ok(EmailProcessingResult::Success {
                message_id: email.message_id.clone(),
                already_completed: false,
            }),
            Ok(_) => Ok(EmailProcessingResult::Failure {
                message_id: email.message_id.clone(),
                error: "LLM response could not be parsed; recorded with safe defaults".to_string(),
            }),
            Err(e) => Err(format!("upsert failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::UnavailableEmbeddingClassifier;
    use crate::repository::fake::InMemoryRepository;
    use async_trait::async_trait;
    use chrono::Utc;
    use entity::sea_orm_active_enums::{Category, LlmFocus, ProcessingType};
    use serde_json::json;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn execute_chat(&self, _request: ChatRequest) -> crate::error::AppResult<crate::llm::ChatResponse> {
            Ok(crate::llm::ChatResponse {
                response: self.0.clone(),
                message: None,
                usage: None,
            })
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn execute_chat(&self, _request: ChatRequest) -> crate::error::AppResult<crate::llm::ChatResponse> {
            Err(crate::error::AppError::Transient("connection reset".to_string()))
        }
    }

    fn schedule_fixture() -> schedule::Model {
        let now = Utc::now();
        schedule::Model {
            id: 1,
            user_id: 1,
            email_account_id: 1,
            name: "test".to_string(),
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
            next_execution_at: None,
            last_executed_at: None,
            total_executions: 0,
            total_emails_processed: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn message(message_id: &str) -> CanonicalMessage {
        CanonicalMessage {
            uid: 1,
            message_id: message_id.to_string(),
            subject: Some("Invoice due".to_string()),
            from: "billing@acme.com".to_string(),
            to: vec!["me@me.com".to_string()],
            cc: vec![],
            bcc: vec![],
            date: Utc::now(),
            body_text: Some("Amount due: $40".to_string()),
            body_html: None,
            flags: vec![],
        }
    }

    async fn repo_with_template() -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_template(entity::prompt_template::Model {
            id: 1,
            name: "general_analysis".to_string(),
            description: String::new(),
            categories: json!([]),
            template: "Subject: {{subject}}\nBody: {{bodyText}}".to_string(),
            expected_output_schema: json!({}),
            version: 1,
            is_active: true,
        })
        .await;
        repo
    }

    #[tokio::test]
    async fn successful_run_writes_completed_record() {
        let repo = repo_with_template().await;
        let llm = Arc::new(FixedLlm(
            r#"{"category":"INVOICE","priority":"HIGH","sentiment":"NEUTRAL","summary":"pay up","confidence":0.9,"importance_score":60}"#
                .to_string(),
        ));
        let pipeline = AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier));
        let schedule = schedule_fixture();
        let email = message("m-1");

        let result = pipeline.process_message(1, &email, &schedule, Some(42)).await;
        assert!(result.is_success());

        let stored = repo.get_processed("m-1").await.unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Completed);
        assert_eq!(stored.category, Category::Invoice);
        assert_eq!(stored.schedule_execution_id, Some(42));
    }

    #[tokio::test]
    async fn second_run_short_circuits_on_completed() {
        let repo = repo_with_template().await;
        let llm = Arc::new(FixedLlm(
            r#"{"category":"WORK","priority":"MEDIUM","sentiment":"NEUTRAL","summary":"ok"}"#.to_string(),
        ));
        let pipeline = AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier));
        let schedule = schedule_fixture();
        let email = message("m-2");

        let first = pipeline.process_message(1, &email, &schedule, None).await;
        assert!(matches!(
            first,
            EmailProcessingResult::Success { already_completed: false, .. }
        ));

        let second = pipeline.process_message(1, &email, &schedule, None).await;
        assert!(matches!(
            second,
            EmailProcessingResult::Success { already_completed: true, .. }
        ));
    }

    #[tokio::test]
    async fn llm_failure_records_failed_with_safe_defaults() {
        let repo = repo_with_template().await;
        let pipeline = AnalysisPipeline::new(repo.clone(), Arc::new(FailingLlm), Arc::new(UnavailableEmbeddingClassifier));
        let schedule = schedule_fixture();
        let email = message("m-3");

        let result = pipeline.process_message(1, &email, &schedule, None).await;
        assert!(!result.is_success());

        let stored = repo.get_processed("m-3").await.unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Failed);
        assert_eq!(stored.category, Category::Personal);
        assert_eq!(stored.confidence, 0.3);
    }

    #[tokio::test]
    async fn sender_priority_boost_is_persisted_in_reasoning() {
        let repo = repo_with_template().await;
        let llm = Arc::new(FixedLlm(
            r#"{"category":"WORK","priority":"MEDIUM","sentiment":"NEUTRAL","summary":"ok","importance_score":50}"#.to_string(),
        ));
        let pipeline = AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier));
        let mut schedule = schedule_fixture();
        schedule.sender_priorities = json!({"billing@acme.com": "URGENT"});
        let email = message("m-4");

        pipeline.process_message(1, &email, &schedule, None).await;

        let stored = repo.get_processed("m-4").await.unwrap();
        assert_eq!(stored.importance_score, Some(80));
        assert!(stored
            .priority_reasoning
            .unwrap()
            .contains("[User override: +30 for sender priority]"));
    }

    #[tokio::test]
    async fn scoring_breakdown_is_persisted_verbatim_from_llm() {
        let repo = repo_with_template().await;
        let llm = Arc::new(FixedLlm(
            r#"{"category":"WORK","priority":"MEDIUM","sentiment":"NEUTRAL","summary":"ok","importance_score":50,"scoring_breakdown":{"urgency":20,"sender_reputation":30}}"#.to_string(),
        ));
        let pipeline = AnalysisPipeline::new(repo.clone(), llm, Arc::new(UnavailableEmbeddingClassifier));
        let schedule = schedule_fixture();
        let email = message("m-5");

        pipeline.process_message(1, &email, &schedule, None).await;

        let stored = repo.get_processed("m-5").await.unwrap();
        assert_eq!(
            stored.scoring_breakdown,
            Some(json!({"urgency": 20, "sender_reputation": 30}))
        );
        // priority_reasoning only covers override boosts, never a
        // restatement of the LLM's own breakdown.
        assert_eq!(stored.priority_reasoning, None);
    }
}
