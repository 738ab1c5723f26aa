use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PromptTemplate::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PromptTemplate::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PromptTemplate::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(PromptTemplate::Description).text().not_null())
                    .col(ColumnDef::new(PromptTemplate::Categories).json_binary().not_null())
                    .col(ColumnDef::new(PromptTemplate::Template).text().not_null())
                    .col(
                        ColumnDef::new(PromptTemplate::ExpectedOutputSchema)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PromptTemplate::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(PromptTemplate::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PromptTemplate::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PromptTemplate {
    Table,
    Id,
    Name,
    Description,
    Categories,
    Template,
    ExpectedOutputSchema,
    Version,
    IsActive,
}
