//! `SeaORM` Entity, the processed_email table (spec.md §3 `ProcessedEmail`).
//!
//! `message_id` is the RFC-822 Message-ID and the sole deduplication key:
//! exactly one row exists per message, upserted by the analysis pipeline.

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use super::sea_orm_active_enums::{Category, Priority, ProcessingStatus, Sentiment};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "processed_email")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: String,
    pub email_account_id: i32,
    pub uid: i64,
    pub subject: Option<String>,
    pub from_address: String,
    pub to_addresses: Json,
    pub cc_addresses: Json,
    pub bcc_addresses: Json,
    pub received_at: DateTimeWithTimeZone,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub processing_status: ProcessingStatus,
    pub category: Category,
    pub priority: Priority,
    pub sentiment: Sentiment,
    pub summary: Option<String>,
    pub tags: Json,
    pub confidence: f32,
    pub importance_score: Option<i32>,
    pub priority_reasoning: Option<String>,
    pub scoring_breakdown: Option<Json>,
    pub schedule_execution_id: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::email_account::Entity",
        from = "Column::EmailAccountId",
        to = "super::email_account::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    EmailAccount,
    #[sea_orm(
        belongs_to = "super::schedule_execution::Entity",
        from = "Column::ScheduleExecutionId",
        to = "super::schedule_execution::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    ScheduleExecution,
    #[sea_orm(has_many = "super::entity_extraction::Entity")]
    EntityExtraction,
    #[sea_orm(has_many = "super::action_item::Entity")]
    ActionItem,
}

impl Related<super::email_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailAccount.def()
    }
}

impl Related<super::schedule_execution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScheduleExecution.def()
    }
}

impl Related<super::entity_extraction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EntityExtraction.def()
    }
}

impl Related<super::action_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActionItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
