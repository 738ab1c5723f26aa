//! `SeaORM` Entity, the entity_extraction table (spec.md §3 `EntityExtraction`).
//! Owned by `processed_email`; deleted and recreated with its parent on
//! every upsert (cascade delete at the FK level).

use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::EntityType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "entity_extraction")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub processed_email_id: String,
    pub entity_type: EntityType,
    pub entity_value: String,
    pub confidence: f32,
    pub context: Option<String>,
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
