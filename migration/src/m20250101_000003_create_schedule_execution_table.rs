use sea_orm_migration::prelude::*;

use crate::m20250101_000002_create_schedule_table::Schedule;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduleExecution::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduleExecution::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScheduleExecution::ScheduleId).integer().not_null())
                    .col(
                        ColumnDef::new(ScheduleExecution::Status)
                            .string()
                            .not_null()
                            .default("RUNNING"),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduleExecution::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScheduleExecution::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::TotalBatchesCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::CompletedBatchesCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::TotalEmailsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::ProcessedEmailsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::FailedEmailsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ScheduleExecution::ProcessingDurationMs).big_integer())
                    .col(ColumnDef::new(ScheduleExecution::ErrorMessage).text())
                    .col(ColumnDef::new(ScheduleExecution::ErrorDetails).json_binary())
                    .col(
                        ColumnDef::new(ScheduleExecution::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduleExecution::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_execution_schedule")
                            .from(ScheduleExecution::Table, ScheduleExecution::ScheduleId)
                            .to(Schedule::Table, Schedule::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schedule_execution_schedule_id")
                    .table(ScheduleExecution::Table)
                    .col(ScheduleExecution::ScheduleId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScheduleExecution::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ScheduleExecution {
    Table,
    Id,
    ScheduleId,
    Status,
    StartedAt,
    CompletedAt,
    MaxAttempts,
    TotalBatchesCount,
    CompletedBatchesCount,
    TotalEmailsCount,
    ProcessedEmailsCount,
    FailedEmailsCount,
    ProcessingDurationMs,
    ErrorMessage,
    ErrorDetails,
    CreatedAt,
    UpdatedAt,
}
