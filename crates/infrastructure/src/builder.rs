use config::DatabaseConfig;
use thiserror::Error;
use tracing::info;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 连接数据库、执行迁移并创建全部仓储
pub async fn connect_storage(config: &DatabaseConfig) -> Result<PgStorage, InfrastructureError> {
    let pool = create_pg_pool(&config.url, config.max_connections).await?;
    MIGRATOR.run(&pool).await?;
    info!(max_connections = config.max_connections, "database ready");
    Ok(PgStorage::new(pool))
}
