use crate::entities::{anime_documents, prelude::*};
use crate::models::anime::AnimeDocument;
use anyhow::Context;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};

/// A catalog document together with the version it was read at.
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    pub document: AnimeDocument,
    pub version: i64,
}

pub struct AnimeDocumentRepository {
    conn: DatabaseConnection,
}

impl AnimeDocumentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn decode(model: anime_documents::Model) -> anyhow::Result<VersionedDocument> {
        let document: AnimeDocument = serde_json::from_str(&model.document)
            .with_context(|| format!("Corrupt anime document: {}", model.id))?;
        Ok(VersionedDocument {
            document,
            version: model.version,
        })
    }

    pub async fn insert(&self, document: &AnimeDocument) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let active_model = anime_documents::ActiveModel {
            id: Set(document.id.to_string()),
            title: Set(document.display_title().to_string()),
            document: Set(serde_json::to_string(document)?),
            version: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        AnimeDocuments::insert(active_model).exec(&self.conn).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Option<VersionedDocument>> {
        AnimeDocuments::find_by_id(id.to_string())
            .one(&self.conn)
            .await?
            .map(Self::decode)
            .transpose()
    }

    pub async fn list(&self) -> anyhow::Result<Vec<AnimeDocument>> {
        let rows = AnimeDocuments::find()
            .order_by_asc(anime_documents::Column::Title)
            .all(&self.conn)
            .await?;

        rows.into_iter()
            .map(|row| Self::decode(row).map(|v| v.document))
            .collect()
    }

    /// Writes `document` only if the stored row is still at
    /// `expected_version`. Returns `false` when another writer got there
    /// first (or the row is gone).
    pub async fn compare_and_swap(
        &self,
        document: &AnimeDocument,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let result = AnimeDocuments::update_many()
            .col_expr(
                anime_documents::Column::Title,
                Expr::value(document.display_title().to_string()),
            )
            .col_expr(
                anime_documents::Column::Document,
                Expr::value(serde_json::to_string(document)?),
            )
            .col_expr(
                anime_documents::Column::Version,
                Expr::value(expected_version + 1),
            )
            .col_expr(
                anime_documents::Column::UpdatedAt,
                Expr::value(Utc::now().to_rfc3339()),
            )
            .filter(anime_documents::Column::Id.eq(document.id.to_string()))
            .filter(anime_documents::Column::Version.eq(expected_version))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let result = AnimeDocuments::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
