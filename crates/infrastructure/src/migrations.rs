use sqlx::migrate::Migrator;

/// 内嵌的数据库迁移，启动时在 Postgres 存储模式下执行
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
