use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AnimeDocuments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AnimeDocuments::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AnimeDocuments::Title).string().not_null())
                    .col(ColumnDef::new(AnimeDocuments::Document).text().not_null())
                    .col(
                        ColumnDef::new(AnimeDocuments::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AnimeDocuments::CreatedAt)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AnimeDocuments::UpdatedAt)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_anime_documents_title")
                    .table(AnimeDocuments::Table)
                    .col(AnimeDocuments::Title)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AnimeDocuments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AnimeDocuments {
    Table,
    Id,
    Title,
    Document,
    Version,
    CreatedAt,
    UpdatedAt,
}
