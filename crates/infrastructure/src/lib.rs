//! 基础设施层实现。
//!
//! 提供 Postgres 仓储、密码哈希和数据库迁移，实现应用层定义的接口。

pub mod migrations;
pub mod password;
pub mod repository;

pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgCartRepository, PgMessageRepository, PgProductRepository, PgStorage,
    PgUserRepository,
};
