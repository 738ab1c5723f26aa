use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExecutionLock::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExecutionLock::ExecutionTime)
                            .timestamp_with_time_zone()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExecutionLock::ScheduleIds)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionLock::AcquiredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExecutionLock::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExecutionLock {
    Table,
    ExecutionTime,
    ScheduleIds,
    AcquiredAt,
}
