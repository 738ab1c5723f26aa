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
                    .table(EntityExtraction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EntityExtraction::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EntityExtraction::ProcessedEmailId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EntityExtraction::EntityType).string().not_null())
                    .col(ColumnDef::new(EntityExtraction::EntityValue).text().not_null())
                    .col(
                        ColumnDef::new(EntityExtraction::Confidence)
                            .float()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(EntityExtraction::Context).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_entity_extraction_processed_email")
                            .from(EntityExtraction::Table, EntityExtraction::ProcessedEmailId)
                            .to(ProcessedEmail::Table, ProcessedEmail::MessageId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_entity_extraction_processed_email")
                    .table(EntityExtraction::Table)
                    .col(EntityExtraction::ProcessedEmailId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EntityExtraction::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EntityExtraction {
    Table,
    Id,
    ProcessedEmailId,
    EntityType,
    EntityValue,
    Confidence,
    Context,
}
