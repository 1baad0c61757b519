//! 数据库连接管理

use ifr_core::{config::DatabaseConfig, IfrError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// 数据库连接池
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 按配置建立连接池
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await
            .map_err(|e| IfrError::Database(e.to_string()))?;
        tracing::info!("Connected to database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
