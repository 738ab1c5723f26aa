//! `SeaORM` Entity, minimal view of the account this core needs to open an
//! IMAP session. Credential storage itself belongs to the external account
//! store (out of scope, see spec.md §1); `credential_ref` is an opaque
//! handle the account store resolves, never a secret value.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "email_account")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub email_address: String,
    pub imap_host: String,
    pub imap_port: i32,
    pub imap_username: String,
    pub use_tls: bool,
    pub credential_ref: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::schedule::Entity")]
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
