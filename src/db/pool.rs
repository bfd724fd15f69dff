use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Bumped whenever a migration is appended to `run_migrations`
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Clone)]
pub struct DbPool(SqlitePool);

impl DbPool {
    pub async fn new(db_path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self(pool))
    }

    /// Single-connection in-memory database; every connection would otherwise
    /// see its own empty schema
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self(pool))
    }

    pub fn inner(&self) -> &SqlitePool {
        &self.0
    }

    /// Highest applied migration version, 0 for an unmigrated database
    pub async fn schema_version(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_migrations")
            .fetch_one(self.inner())
            .await?;
        row.try_get("version")
    }
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    info!("Running database migrations");

    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
    "#).execute(pool.inner()).await?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?, ?)",
    )
    .bind(SCHEMA_VERSION)
    .bind(Utc::now().to_rfc3339())
    .execute(pool.inner())
    .await?;

    if result.rows_affected() > 0 {
        info!("Applied schema version {}", SCHEMA_VERSION);
    }

    info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = DbPool::in_memory().await.unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations")
            .fetch_one(pool.inner())
            .await
            .unwrap()
            .get("n");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_file_database_created_on_demand() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("site.db");

        let pool = DbPool::new(path.to_str().unwrap()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(path.exists());
    }
}
