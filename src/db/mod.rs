//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the `wallets` table if it does not exist yet
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                id      BIGSERIAL PRIMARY KEY,
                address VARCHAR(42) NOT NULL UNIQUE,
                balance BIGINT NOT NULL CHECK (balance >= 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Wallet schema ready");
        Ok(())
    }

    /// Drop every wallet and restart id assignment. Test fixtures only.
    pub async fn reset_wallets(&self) -> Result<(), sqlx::Error> {
        sqlx::query("TRUNCATE TABLE wallets RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
