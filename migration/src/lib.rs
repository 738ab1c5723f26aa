pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_email_account_table;
mod m20250101_000002_create_schedule_table;
mod m20250101_000003_create_schedule_execution_table;
mod m20250101_000004_create_execution_lock_table;
mod m20250101_000005_create_processed_email_table;
mod m20250101_000006_create_entity_extraction_table;
mod m20250101_000007_create_action_item_table;
mod m20250101_000008_create_prompt_template_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_email_account_table::Migration),
            Box::new(m20250101_000002_create_schedule_table::Migration),
            Box::new(m20250101_000003_create_schedule_execution_table::Migration),
            Box::new(m20250101_000004_create_execution_lock_table::Migration),
            Box::new(m20250101_000005_create_processed_email_table::Migration),
            Box::new(m20250101_000006_create_entity_extraction_table::Migration),
            Box::new(m20250101_000007_create_action_item_table::Migration),
            Box::new(m20250101_000008_create_prompt_template_table::Migration),
        ]
    }
}
