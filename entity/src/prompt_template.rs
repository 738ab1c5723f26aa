//! `SeaORM` Entity, the prompt_template table (spec.md §3 `PromptTemplate`).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "prompt_template")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub description: String,
    /// JSON array of `Category` strings this template is eligible for.
    pub categories: Json,
    pub template: String,
    /// JSON-schema-shaped description of the fields `parseAndValidate` expects.
    pub expected_output_schema: Json,
    pub version: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
