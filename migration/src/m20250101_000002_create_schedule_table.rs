use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_email_account_table::EmailAccount;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Schedule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Schedule::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Schedule::UserId).integer().not_null())
                    .col(ColumnDef::new(Schedule::EmailAccountId).integer().not_null())
                    .col(ColumnDef::new(Schedule::Name).string().not_null())
                    .col(ColumnDef::new(Schedule::ProcessingType).string().not_null())
                    .col(ColumnDef::new(Schedule::DateRangeFrom).timestamp_with_time_zone())
                    .col(ColumnDef::new(Schedule::DateRangeTo).timestamp_with_time_zone())
                    .col(ColumnDef::new(Schedule::CronExpression).string())
                    .col(
                        ColumnDef::new(Schedule::Timezone)
                            .string()
                            .not_null()
                            .default("UTC"),
                    )
                    .col(ColumnDef::new(Schedule::SpecificDates).json_binary())
                    .col(
                        ColumnDef::new(Schedule::BatchSize)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(Schedule::SenderPriorities)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Schedule::EmailTypePriorities)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Schedule::LlmFocus)
                            .string()
                            .not_null()
                            .default("general"),
                    )
                    .col(
                        ColumnDef::new(Schedule::IsEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Schedule::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Schedule::NextExecutionAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Schedule::LastExecutedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Schedule::TotalExecutions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Schedule::TotalEmailsProcessed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Schedule::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Schedule::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedule_email_account")
                            .from(Schedule::Table, Schedule::EmailAccountId)
                            .to(EmailAccount::Table, EmailAccount::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schedule_due")
                    .table(Schedule::Table)
                    .col(Schedule::IsEnabled)
                    .col(Schedule::NextExecutionAt)
                    .to_owned(),
            )
            .await
        // The "at most one isDefault=true per (userId, emailAccountId)" invariant
        // is a partial-uniqueness constraint the sea-query builder can't express
        // portably. Schedule creation/mutation is owned by an external
        // collaborator (spec.md §1); this core only reads schedules, so the
        // invariant is documented here rather than enforced by this crate.
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Schedule::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Schedule {
    Table,
    Id,
    UserId,
    EmailAccountId,
    Name,
    ProcessingType,
    DateRangeFrom,
    DateRangeTo,
    CronExpression,
    Timezone,
    SpecificDates,
    BatchSize,
    SenderPriorities,
    EmailTypePriorities,
    LlmFocus,
    IsEnabled,
    IsDefault,
    NextExecutionAt,
    LastExecutedAt,
    TotalExecutions,
    TotalEmailsProcessed,
    CreatedAt,
    UpdatedAt,
}
