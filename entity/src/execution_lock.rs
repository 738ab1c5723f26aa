//! `SeaORM` Entity, the execution_lock table (spec.md §3 `ExecutionLock`).
//!
//! The unique key is `execution_time`, truncated to the minute; its mere
//! presence is the cluster-wide mutual-exclusion mechanism described in
//! spec.md §4.2/§9 — no distributed coordinator required.

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "execution_lock")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub execution_time: DateTimeWithTimeZone,
    /// Schedule ids firing at this instant, kept for diagnostics only.
    pub schedule_ids: Json,
    pub acquired_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
