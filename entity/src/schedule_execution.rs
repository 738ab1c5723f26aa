//! `SeaORM` Entity, the schedule_execution table (spec.md §3 `ScheduleExecution`).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use super::sea_orm_active_enums::ExecutionStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "schedule_execution")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub schedule_id: i32,
    pub status: ExecutionStatus,
    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(default_value = 1)]
    pub max_attempts: i32,
    #[sea_orm(default_value = 0)]
    pub total_batches_count: i32,
    #[sea_orm(default_value = 0)]
    pub completed_batches_count: i32,
    #[sea_orm(default_value = 0)]
    pub total_emails_count: i32,
    #[sea_orm(default_value = 0)]
    pub processed_emails_count: i32,
    #[sea_orm(default_value = 0)]
    pub failed_emails_count: i32,
    pub processing_duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub error_details: Option<Json>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::schedule::Entity",
        from = "Column::ScheduleId",
        to = "super::schedule::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Schedule,
    #[sea_orm(has_many = "super::processed_email::Entity")]
    ProcessedEmail,
}

impl Related<super::schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedule.def()
    }
}

impl Related<super::processed_email::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcessedEmail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
