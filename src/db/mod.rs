//! Database connection pool, migrations, and health check.
//!
//! One Postgres pool is shared by every worker. Excursion reads and writes
//! live in [`excursion`].

pub mod excursion;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 10;

/// Database handle. Owns the connection pool shared across all workers.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres by URL and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(PgConnectOptions::from_str(url)?).await
    }

    /// Connect with prepared options, e.g. from [`crate::config::DatabaseConfig`].
    pub async fn connect_with(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
