//! `SeaORM` Entity, the action_item table (spec.md §3 `ActionItem`).
//! Owned by `processed_email`; deleted and recreated with its parent on
//! every upsert (cascade delete at the FK level).

use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{ActionType, Priority};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "action_item")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub processed_email_id: String,
    pub action_type: ActionType,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<DateTimeWithTimeZone>,
    pub is_completed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::processed_email::Entity",
        from = "Column::ProcessedEmailId",
        to = "super::processed_email::Column::MessageId",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    ProcessedEmail,
}

impl Related<super::processed_email::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcessedEmail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
