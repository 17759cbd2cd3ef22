//! Process-wide database connection pool.
//!
//! Wraps a `sqlx` [`AnyPool`] so the driver is picked from the connection URL
//! scheme (`mysql://` in production, `sqlite:` for local runs and tests). The
//! pool is created once at startup and cloned into every repository; clones
//! share the same connections.

use crate::server::config::ServerConfig;
use core::time::Duration;
use sqlx::{AnyPool, any::AnyPoolOptions};

#[derive(Clone, Debug)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Opens a pool bounded to `max_connections` and verifies that at least
    /// one connection can be established.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn from_config(config: &ServerConfig) -> Result<Self, sqlx::Error> {
        Self::connect(
            &config.database_url,
            config.max_connections,
            config.acquire_timeout,
        )
        .await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Waits for checked-out connections to be returned, then closes them.
    /// Queries issued afterwards fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
