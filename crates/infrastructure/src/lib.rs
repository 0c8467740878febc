//! 基础设施层实现。
//!
//! 基于 PostgreSQL 的配对、消息和用户资料存储，实现应用层定义的仓储接口。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{connect_storage, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgIdentityDirectory, PgMatchRepository, PgMessageRepository, PgStorage,
};
