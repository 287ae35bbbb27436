//! Connection pool setup. The schema is plain SQL run with `IF NOT EXISTS`
//! guards rather than a tracked migration history, so the same pool works
//! unmodified against the Postgres deployment and the SQLite database used
//! in tests.

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct Db {
    pool: AnyPool,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(10).connect(database_url).await?;
        let db = Self { pool };
        db.run_schema().await?;
        Ok(db)
    }

    async fn run_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_applies_schema_to_an_in_memory_sqlite_database() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bots")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
