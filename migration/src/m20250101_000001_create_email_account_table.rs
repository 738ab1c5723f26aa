use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailAccount::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailAccount::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailAccount::UserId).integer().not_null())
                    .col(ColumnDef::new(EmailAccount::EmailAddress).string().not_null())
                    .col(ColumnDef::new(EmailAccount::ImapHost).string().not_null())
                    .col(ColumnDef::new(EmailAccount::ImapPort).integer().not_null())
                    .col(ColumnDef::new(EmailAccount::ImapUsername).string().not_null())
                    .col(ColumnDef::new(EmailAccount::UseTls).boolean().not_null().default(true))
                    .col(ColumnDef::new(EmailAccount::CredentialRef).string().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailAccount::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailAccount {
    Table,
    Id,
    UserId,
    EmailAddress,
    ImapHost,
    ImapPort,
    ImapUsername,
    UseTls,
    CredentialRef,
}
