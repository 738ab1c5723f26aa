use sea_orm_migration::prelude::*;

use crate::m20250101_000005_create_processed_email_table::ProcessedEmail;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActionItem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActionItem::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActionItem::ProcessedEmailId).string().not_null())
                    .col(ColumnDef::new(ActionItem::ActionType).string().not_null())
                    .col(ColumnDef::new(ActionItem::Description).text().not_null())
                    .col(
                        ColumnDef::new(ActionItem::Priority)
                            .string()
                            .not_null()
                            .default("MEDIUM"),
                    )
                    .col(ColumnDef::new(ActionItem::DueDate).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ActionItem::IsCompleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_action_item_processed_email")
                            .from(ActionItem::Table, ActionItem::ProcessedEmailId)
                            .to(ProcessedEmail::Table, ProcessedEmail::MessageId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_action_item_processed_email")
                    .table(ActionItem::Table)
                    .col(ActionItem::ProcessedEmailId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActionItem::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ActionItem {
    Table,
    Id,
    ProcessedEmailId,
    ActionType,
    Description,
    Priority,
    DueDate,
    IsCompleted,
}
