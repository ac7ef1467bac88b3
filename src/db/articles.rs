//! Article store on Postgres.
//!
//! The claim is `UPDATE ... WHERE id = $id AND status = $expected`; Postgres
//! row locking makes it atomic. When no row changes, a follow-up read tells a
//! lost race apart from a missing article.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{AiGenerated, Article, Content, ItemId, ItemStatus};
use crate::store::{TransitionOutcome, WorkItemStore};

const COLUMNS: &str = "id, status, content, ai_generated, updated_at";

/// How many of the oldest candidates a lookup picks from.
const CANDIDATE_WINDOW: i64 = 16;

impl super::Db {
    /// Create the article table under the configured collection name.
    ///
    /// The bundled migration creates `staging_articles`; any other collection
    /// gets the same shape here.
    pub async fn ensure_collection(&self) -> Result<()> {
        let table = &self.collection;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id            TEXT PRIMARY KEY,
                status        TEXT NOT NULL,
                content       JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                ai_generated  JSONB,
                updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_status_updated_idx ON {table} (status, updated_at)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert an article unless one with the same id exists. Returns whether it was inserted.
    pub async fn insert_article(&self, article: &Article) -> Result<bool> {
        let content = serde_json::to_value(&article.content)
            .map_err(|e| Error::Other(format!("cannot encode content: {e}")))?;
        let ai_generated = article
            .ai_generated
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::Other(format!("cannot encode annotations: {e}")))?;

        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
            self.collection
        );
        let rows_affected = sqlx::query(&sql)
            .bind(article.id.as_str())
            .bind(article.status.as_str())
            .bind(content)
            .bind(ai_generated)
            .bind(article.updated_at)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected == 1)
    }
}

#[async_trait]
impl WorkItemStore for super::Db {
    async fn find_candidate(&self, status: ItemStatus) -> Result<Option<Article>> {
        // Random pick among the oldest few, so concurrent invocations mostly
        // go after different rows.
        let sql = format!(
            "SELECT {COLUMNS} FROM (
                SELECT {COLUMNS} FROM {} WHERE status = $1 ORDER BY updated_at LIMIT $2
            ) oldest ORDER BY random() LIMIT 1",
            self.collection
        );
        let row: Option<ArticleRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .bind(CANDIDATE_WINDOW)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ArticleRow::try_into_article).transpose()
    }

    async fn transition(
        &self,
        id: &ItemId,
        expected: ItemStatus,
        new: ItemStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let sql = format!(
            "UPDATE {} SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
            self.collection
        );
        let rows_affected = sqlx::query(&sql)
            .bind(new.as_str())
            .bind(at)
            .bind(id.as_str())
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 1 {
            return Ok(TransitionOutcome::Applied);
        }

        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", self.collection);
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(if exists {
            TransitionOutcome::Conflict
        } else {
            TransitionOutcome::NotFound
        })
    }

    async fn get_by_id(&self, id: &ItemId) -> Result<Option<Article>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.collection);
        let row: Option<ArticleRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ArticleRow::try_into_article).transpose()
    }

    async fn find_stale(
        &self,
        status: ItemStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE status = $1 AND updated_at < $2 ORDER BY updated_at LIMIT $3",
            self.collection
        );
        let rows: Vec<ArticleRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .bind(updated_before)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ArticleRow::try_into_article).collect()
    }

    async fn ping(&self) -> Result<()> {
        self.health_check().await
    }

    async fn annotate(&self, id: &ItemId, ai_generated: &AiGenerated) -> Result<()> {
        let value = serde_json::to_value(ai_generated)
            .map_err(|e| Error::Other(format!("cannot encode annotations: {e}")))?;
        let sql = format!("UPDATE {} SET ai_generated = $1 WHERE id = $2", self.collection);
        let rows_affected = sqlx::query(&sql)
            .bind(value)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("article {id}")));
        }
        Ok(())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: String,
    status: String,
    content: serde_json::Value,
    ai_generated: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

impl ArticleRow {
    /// `content` and `ai_generated` are written by other stages. A row whose
    /// payload has the wrong shape still claims and advances; only the status
    /// must parse.
    fn try_into_article(self) -> Result<Article> {
        let content = decode_content(&self.id, self.content);
        let ai_generated = self.ai_generated.and_then(|value| {
            serde_json::from_value::<AiGenerated>(value)
                .map_err(|e| warn!(item.id = %self.id, error = %e, "ignoring malformed annotations"))
                .ok()
        });

        Ok(Article {
            status: self.status.parse()?,
            id: ItemId(self.id),
            content,
            ai_generated,
            updated_at: self.updated_at,
        })
    }
}

fn decode_content(id: &str, value: serde_json::Value) -> Content {
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(item.id = %id, error = %e, "malformed content, reading it as empty");
        Content::default()
    })
}
