pub mod action_item;
pub mod email_account;
pub mod entity_extraction;
pub mod execution_lock;
pub mod processed_email;
pub mod prompt_template;
pub mod schedule;
pub mod schedule_execution;
pub mod sea_orm_active_enums;

pub mod prelude {
    pub use super::action_item::{self, Entity as ActionItem};
    pub use super::email_account::{self, Entity as EmailAccount};
    pub use super::entity_extraction::{self, Entity as EntityExtraction};
    pub use super::execution_lock::{self, Entity as ExecutionLock};
    pub use super::processed_email::{self, Entity as ProcessedEmail};
    pub use super::prompt_template::{self, Entity as PromptTemplate};
    pub use super::schedule::{self, Entity as Schedule};
    pub use super::schedule_execution::{self, Entity as ScheduleExecution};
    pub use super::sea_orm_active_enums::*;
}
