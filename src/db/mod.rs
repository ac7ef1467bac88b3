//! Database connection pool, migrations, and health check.
//!
//! One Postgres pool backs both the article store and the pgmq queues.

pub mod articles;
pub mod pgmq;

use crate::config::validate_identifier;
use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool and the article table name.
pub struct Db {
    pool: PgPool,
    collection: String,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    ///
    /// `collection` names the article table and must be a plain identifier.
    pub async fn connect(url: &str, collection: &str) -> Result<Self> {
        let collection = validate_identifier("collection", collection.to_string())?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool, collection })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}
