use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TransferBatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransferBatches::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TransferBatches::AnimeId).string().not_null())
                    .col(
                        ColumnDef::new(TransferBatches::AnimeTitle)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(TransferBatches::SeasonNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransferBatches::FolderId).string().not_null())
                    .col(ColumnDef::new(TransferBatches::State).string().not_null())
                    .col(
                        ColumnDef::new(TransferBatches::Total)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TransferBatches::Processed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TransferBatches::Successful)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TransferBatches::Failed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TransferBatches::Skipped)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TransferBatches::StartedAt)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransferBatches::FinishedAt).string().null())
                    .col(ColumnDef::new(TransferBatches::Error).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transfer_batches_anime")
                    .table(TransferBatches::Table)
                    .col(TransferBatches::AnimeId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TransferBatches::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum TransferBatches {
    Table,
    Id,
    AnimeId,
    AnimeTitle,
    SeasonNumber,
    FolderId,
    State,
    Total,
    Processed,
    Successful,
    Failed,
    Skipped,
    StartedAt,
    FinishedAt,
    Error,
}
