pub mod repository;
pub mod schema;
pub mod task_repository;

use crate::settings::DatabaseSettings;
use crate::utils::error::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::PathBuf;

pub use repository::*;
pub use task_repository::*;

/// SQLite 单条语句的绑定参数上限是 32766，分批时按这个数留足余量
pub const MAX_BIND_PARAMS: usize = 30000;

/// 初始化数据库
pub async fn init_database(settings: &DatabaseSettings) -> Result<SqlitePool> {
    let db_url = if settings.url.is_empty() {
        let data_dir = get_data_dir()?;
        std::fs::create_dir_all(&data_dir)?;
        format!("sqlite://{}?mode=rwc", data_dir.join("catalog.db").display())
    } else {
        settings.url.clone()
    };

    tracing::info!("Initializing database at: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&db_url)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Running database migrations");

    for ddl in [
        schema::CREATE_DATA_SOURCE_TABLE,
        schema::CREATE_DB_TABLE,
        schema::CREATE_CATALOG_TABLE_TABLE,
        schema::CREATE_CATALOG_PARTITION_TABLE,
        schema::CREATE_PARTITION_SOURCE_INDEX,
        schema::CREATE_JOB_TABLE,
        schema::CREATE_TASK_TABLE,
        schema::CREATE_TASK_INDEX,
        schema::CREATE_TASK_PARTITION_TABLE,
        schema::CREATE_TASK_PARTITION_INDEX,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Database migrations completed");

    Ok(())
}

/// 获取应用数据目录
fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "Data directory not found"))?
        .join("catalog_migrator");

    Ok(data_dir)
}
