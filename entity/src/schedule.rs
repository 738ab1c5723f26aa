//! `SeaORM` Entity, the schedule table (spec.md §3 `Schedule`).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use super::sea_orm_active_enums::{LlmFocus, ProcessingType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "schedule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub email_account_id: i32,
    pub name: String,
    pub processing_type: ProcessingType,
    pub date_range_from: Option<DateTimeWithTimeZone>,
    pub date_range_to: Option<DateTimeWithTimeZone>,
    pub cron_expression: Option<String>,
    #[sea_orm(default_value = "UTC")]
    pub timezone: String,
    /// JSON array of RFC-3339 timestamps, only set for `SpecificDates`.
    pub specific_dates: Option<Json>,
    #[sea_orm(default_value = 5)]
    pub batch_size: i32,
    /// `map<address|domain, Priority>` serialized as a JSON object.
    pub sender_priorities: Json,
    /// `map<Category, Priority>` serialized as a JSON object.
    pub email_type_priorities: Json,
    pub llm_focus: LlmFocus,
    pub is_enabled: bool,
    pub is_default: bool,
    pub next_execution_at: Option<DateTimeWithTimeZone>,
    pub last_executed_at: Option<DateTimeWithTimeZone>,
    pub total_executions: i64,
    pub total_emails_processed: i64,
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
    #[sea_orm(has_many = "super::schedule_execution::Entity")]
    ScheduleExecution,
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

impl ActiveModelBehavior for ActiveModel {}
