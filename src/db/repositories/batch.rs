use crate::entities::{prelude::*, transfer_batches};
use crate::models::transfer::BatchStatus;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

#[allow(clippy::cast_possible_wrap)]
const fn count(value: usize) -> i64 {
    value as i64
}

pub struct BatchRepository {
    conn: DatabaseConnection,
}

impl BatchRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts or refreshes the durable summary of a batch.
    pub async fn upsert(&self, status: &BatchStatus) -> anyhow::Result<()> {
        let active_model = transfer_batches::ActiveModel {
            id: Set(status.id.clone()),
            anime_id: Set(status.anime_id.clone()),
            anime_title: Set(status.anime_title.clone()),
            season_number: Set(status.season_number),
            folder_id: Set(status.folder_id.clone()),
            state: Set(status.state.as_str().to_string()),
            total: Set(count(status.stats.total)),
            processed: Set(count(status.stats.processed)),
            successful: Set(count(status.stats.successful)),
            failed: Set(count(status.stats.failed)),
            skipped: Set(count(status.stats.skipped)),
            started_at: Set(status.started_at.to_rfc3339()),
            finished_at: Set(status.finished_at.map(|t| t.to_rfc3339())),
            error: Set(status.error.clone()),
        };

        TransferBatches::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(transfer_batches::Column::Id)
                    .update_columns([
                        transfer_batches::Column::State,
                        transfer_batches::Column::Total,
                        transfer_batches::Column::Processed,
                        transfer_batches::Column::Successful,
                        transfer_batches::Column::Failed,
                        transfer_batches::Column::Skipped,
                        transfer_batches::Column::FinishedAt,
                        transfer_batches::Column::Error,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Option<transfer_batches::Model>> {
        Ok(TransferBatches::find_by_id(id.to_string())
            .one(&self.conn)
            .await?)
    }

    pub async fn recent(&self, limit: u64) -> anyhow::Result<Vec<transfer_batches::Model>> {
        Ok(TransferBatches::find()
            .order_by_desc(transfer_batches::Column::StartedAt)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    pub async fn for_anime(&self, anime_id: &str) -> anyhow::Result<Vec<transfer_batches::Model>> {
        Ok(TransferBatches::find()
            .filter(transfer_batches::Column::AnimeId.eq(anime_id))
            .order_by_desc(transfer_batches::Column::StartedAt)
            .all(&self.conn)
            .await?)
    }

    /// Marks batches left `running` by a previous process as aborted.
    pub async fn abort_unfinished(&self) -> anyhow::Result<u64> {
        let result = TransferBatches::update_many()
            .col_expr(
                transfer_batches::Column::State,
                sea_orm::sea_query::Expr::value("aborted"),
            )
            .col_expr(
                transfer_batches::Column::Error,
                sea_orm::sea_query::Expr::value("process exited while running"),
            )
            .filter(transfer_batches::Column::State.eq("running"))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
