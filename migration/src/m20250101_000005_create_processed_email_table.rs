use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_email_account_table::EmailAccount;
use crate::m20250101_000003_create_schedule_execution_table::ScheduleExecution;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProcessedEmail::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProcessedEmail::MessageId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProcessedEmail::EmailAccountId).integer().not_null())
                    .col(ColumnDef::new(ProcessedEmail::Uid).big_integer().not_null())
                    .col(ColumnDef::new(ProcessedEmail::Subject).text())
                    .col(ColumnDef::new(ProcessedEmail::FromAddress).string().not_null())
                    .col(ColumnDef::new(ProcessedEmail::ToAddresses).json_binary().not_null())
                    .col(ColumnDef::new(ProcessedEmail::CcAddresses).json_binary().not_null())
                    .col(ColumnDef::new(ProcessedEmail::BccAddresses).json_binary().not_null())
                    .col(
                        ColumnDef::new(ProcessedEmail::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProcessedEmail::BodyText).text())
                    .col(ColumnDef::new(ProcessedEmail::BodyHtml).text())
                    .col(
                        ColumnDef::new(ProcessedEmail::ProcessingStatus)
                            .string()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(ProcessedEmail::Category)
                            .string()
                            .not_null()
                            .default("PERSONAL"),
                    )
                    .col(
                        ColumnDef::new(ProcessedEmail::Priority)
                            .string()
                            .not_null()
                            .default("MEDIUM"),
                    )
                    .col(
                        ColumnDef::new(ProcessedEmail::Sentiment)
                            .string()
                            .not_null()
                            .default("NEUTRAL"),
                    )
                    .col(ColumnDef::new(ProcessedEmail::Summary).text())
                    .col(ColumnDef::new(ProcessedEmail::Tags).json_binary().not_null())
                    .col(
                        ColumnDef::new(ProcessedEmail::Confidence)
                            .float()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ProcessedEmail::ImportanceScore).integer())
                    .col(ColumnDef::new(ProcessedEmail::PriorityReasoning).text())
                    .col(ColumnDef::new(ProcessedEmail::ScoringBreakdown).json_binary())
                    .col(ColumnDef::new(ProcessedEmail::ScheduleExecutionId).integer())
                    .col(
                        ColumnDef::new(ProcessedEmail::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProcessedEmail::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_processed_email_email_account")
                            .from(ProcessedEmail::Table, ProcessedEmail::EmailAccountId)
                            .to(EmailAccount::Table, EmailAccount::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_processed_email_schedule_execution")
                            .from(ProcessedEmail::Table, ProcessedEmail::ScheduleExecutionId)
                            .to(ScheduleExecution::Table, ScheduleExecution::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_processed_email_account")
                    .table(ProcessedEmail::Table)
                    .col(ProcessedEmail::EmailAccountId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProcessedEmail::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ProcessedEmail {
    Table,
    MessageId,
    EmailAccountId,
    Uid,
    Subject,
    FromAddress,
    ToAddresses,
    CcAddresses,
    BccAddresses,
    ReceivedAt,
    BodyText,
    BodyHtml,
    ProcessingStatus,
    Category,
    Priority,
    Sentiment,
    Summary,
    Tags,
    Confidence,
    ImportanceScore,
    PriorityReasoning,
    ScoringBreakdown,
    ScheduleExecutionId,
    CreatedAt,
    UpdatedAt,
}
