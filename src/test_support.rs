//! 测试用的内存库、脚本化的元数据抓取实现和样例数据

use crate::db::{run_migrations, DataSourceRepository};
use crate::models::{
    Column, CreateDataSourceRequest, DataSource, DatabaseMeta, Job, JobConfig, JobType,
    PartitionMeta, SourceConfig, SourceType, TableMeta, TableSchema, Task, TaskStatus, TaskType,
};
use crate::services::catalog_sync::{CatalogSynchronizer, RefreshSummary};
use crate::services::crawler::{CrawlerRegistry, MetadataCrawler};
use crate::services::id_allocator::IdAllocator;
use crate::services::progress::ProgressRegistry;
use crate::settings::Settings;
use crate::utils::error::{AppError, Result};
use crate::utils::KeyLock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 单连接的内存库，已经建好表
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub async fn register_source(pool: &SqlitePool, name: &str, source_type: SourceType) -> DataSource {
    let repo = DataSourceRepository::new(pool);
    repo.insert(&CreateDataSourceRequest {
        name: name.to_string(),
        source_type,
        config: SourceConfig::default(),
    })
    .await
    .unwrap();
    repo.find_by_name(name).await.unwrap()
}

pub fn sample_job(id: i64) -> Job {
    Job {
        id,
        description: None,
        source_id: 1,
        source_name: "hive1".to_string(),
        db_name: "d".to_string(),
        dst_db_name: "d".to_string(),
        job_type: JobType::Tables,
        task_type: TaskType::HiveToMc,
        config: JobConfig::default(),
        stopped: false,
        created_at: Utc::now(),
    }
}

pub fn sample_task(id: i64, job_id: i64, table_id: i64, partitions: Vec<i64>) -> Task {
    Task {
        id,
        job_id,
        source_id: 1,
        db_id: 1,
        table_id,
        db_name: "d".to_string(),
        schema_name: String::new(),
        table_name: "t1".to_string(),
        dst_db_name: "d".to_string(),
        dst_table_name: "t1".to_string(),
        task_type: TaskType::HiveToMc,
        status: TaskStatus::Init,
        running: false,
        restart: false,
        stopped: false,
        partitions,
        start_time: None,
        end_time: None,
        created_at: Utc::now(),
    }
}

/// 内存里的元数据源，测试可以随时改它返回的内容
#[derive(Debug, Default)]
pub struct MockCrawler {
    databases: Mutex<Vec<DatabaseMeta>>,
    tables: Mutex<Vec<TableMeta>>,
    partitions: Mutex<Vec<PartitionMeta>>,
    failing_table: Mutex<Option<String>>,
    config_error: Mutex<Option<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockCrawler {
    pub fn add_database(&self, name: &str) {
        let mut dbs = self.databases.lock().unwrap();
        if !dbs.iter().any(|d| d.name == name) {
            dbs.push(DatabaseMeta {
                name: name.to_string(),
                owner: Some("admin".to_string()),
                ..Default::default()
            });
        }
    }

    /// 分区列都是 string；每个分区 size/rows 为 10，不分区的表为 7
    pub fn add_table(&self, db: &str, table: &str, partition_columns: &[&str], values: &[&str]) {
        let columns = partition_columns.iter().map(|c| (*c, "string")).collect::<Vec<_>>();
        self.add_typed_table(db, table, &columns, values);
    }

    pub fn add_typed_table(
        &self,
        db: &str,
        table: &str,
        partition_columns: &[(&str, &str)],
        values: &[&str],
    ) {
        self.add_database(db);
        let partitioned = !partition_columns.is_empty();
        self.tables.lock().unwrap().push(TableMeta {
            db_name: db.to_string(),
            name: table.to_string(),
            table_type: Some("MANAGED_TABLE".to_string()),
            schema: TableSchema {
                columns: vec![Column::new("id", "bigint"), Column::new("name", "string")],
                partition_columns: partition_columns
                    .iter()
                    .map(|(name, data_type)| Column::new(name, data_type))
                    .collect(),
            },
            has_partitions: partitioned,
            size: (!partitioned).then_some(7),
            num_rows: (!partitioned).then_some(7),
            ..Default::default()
        });

        let mut partitions = self.partitions.lock().unwrap();
        for value in values {
            partitions.push(PartitionMeta {
                db_name: db.to_string(),
                table_name: table.to_string(),
                value: value.to_string(),
                size: Some(10),
                num_rows: Some(10),
                ..Default::default()
            });
        }
    }

    pub fn set_partition_rows(&self, db: &str, table: &str, value: &str, rows: i64) {
        self.update_partition(db, table, value, |p| p.num_rows = Some(rows));
    }

    pub fn set_partition_size(&self, db: &str, table: &str, value: &str, size: i64) {
        self.update_partition(db, table, value, |p| p.size = Some(size));
    }

    fn update_partition(&self, db: &str, table: &str, value: &str, f: impl FnOnce(&mut PartitionMeta)) {
        let mut partitions = self.partitions.lock().unwrap();
        let partition = partitions
            .iter_mut()
            .find(|p| p.db_name == db && p.table_name == table && p.value == value)
            .unwrap();
        f(partition);
    }

    /// 所有库、表、分区的 last_ddl_time 都设成同一个时间
    pub fn set_last_ddl_time(&self, time: DateTime<Utc>) {
        for db in self.databases.lock().unwrap().iter_mut() {
            db.last_ddl_time = Some(time);
        }
        for table in self.tables.lock().unwrap().iter_mut() {
            table.last_ddl_time = Some(time);
        }
        for partition in self.partitions.lock().unwrap().iter_mut() {
            partition.last_ddl_time = Some(time);
        }
    }

    /// 之后对这张表的 get_table 都会失败
    pub fn fail_on_table(&self, table: &str) {
        *self.failing_table.lock().unwrap() = Some(table.to_string());
    }

    pub fn reject_config(&self, message: &str) {
        *self.config_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataCrawler for MockCrawler {
    async fn open(&self, _config: &SourceConfig) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_database_names(&self) -> Result<Vec<String>> {
        Ok(self.databases.lock().unwrap().iter().map(|d| d.name.clone()).collect())
    }

    async fn get_database(&self, name: &str) -> Result<DatabaseMeta> {
        self.databases
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| AppError::Crawl(format!("database {} not found", name)))
    }

    async fn list_table_names(&self, db: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.db_name == db)
            .map(|t| t.name.clone())
            .collect())
    }

    async fn get_table(&self, db: &str, table: &str) -> Result<TableMeta> {
        if self.failing_table.lock().unwrap().as_deref() == Some(table) {
            return Err(AppError::Crawl(format!("metastore unavailable for {}.{}", db, table)));
        }
        self.tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.db_name == db && t.name == table)
            .cloned()
            .ok_or_else(|| AppError::Crawl(format!("table {}.{} not found", db, table)))
    }

    async fn list_partitions(&self, db: &str, table: &str) -> Result<Vec<PartitionMeta>> {
        Ok(self
            .partitions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.db_name == db && p.table_name == table)
            .cloned()
            .collect())
    }

    async fn get_partition(&self, db: &str, table: &str, values: &[String]) -> Result<PartitionMeta> {
        let wanted = values.join("/");
        self.partitions
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                let positional: Vec<&str> = p
                    .value
                    .split('/')
                    .map(|kv| kv.split_once('=').map_or(kv, |(_, v)| v))
                    .collect();
                p.db_name == db && p.table_name == table && positional.join("/") == wanted
            })
            .cloned()
            .ok_or_else(|| AppError::Crawl(format!("partition {} of {}.{} not found", wanted, db, table)))
    }

    async fn check_config(&self, _config: &SourceConfig) -> Result<()> {
        match self.config_error.lock().unwrap().clone() {
            Some(message) => Err(AppError::Config(message)),
            None => Ok(()),
        }
    }
}

/// 库 d：t1 按 day（int）分区，有 day=1、day=2 两个分区；t2 不分区
pub fn scenario_crawler() -> Arc<MockCrawler> {
    let crawler = Arc::new(MockCrawler::default());
    crawler.add_typed_table("d", "t1", &[("day", "int")], &["day=1", "day=2"]);
    crawler.add_table("d", "t2", &[], &[]);
    crawler
}

/// 注册好 hive1 数据源（脚本化抓取）的完整环境
pub struct TestEnv {
    pub pool: SqlitePool,
    pub settings: Settings,
    pub source: DataSource,
    pub crawler: Arc<MockCrawler>,
    pub crawlers: CrawlerRegistry,
    pub progress: Arc<ProgressRegistry>,
    pub ids: IdAllocator,
    pub locks: KeyLock,
}

impl TestEnv {
    pub async fn new() -> Self {
        let pool = memory_pool().await;
        let source = register_source(&pool, "hive1", SourceType::Hive).await;
        let crawler = scenario_crawler();

        let mut crawlers = CrawlerRegistry::new();
        let shared = crawler.clone();
        crawlers.register(
            SourceType::Hive,
            Arc::new(move || shared.clone() as Arc<dyn MetadataCrawler>),
        );

        Self {
            pool,
            settings: Settings::for_tests(),
            source,
            crawler,
            crawlers,
            progress: Arc::new(ProgressRegistry::new()),
            ids: IdAllocator::new(0, 0),
            locks: KeyLock::new(),
        }
    }

    /// 已经刷新过一次
    pub async fn refreshed() -> Self {
        let env = Self::new().await;
        env.refresh().await.unwrap();
        env
    }

    pub async fn refresh(&self) -> Result<RefreshSummary> {
        CatalogSynchronizer::new(&self.pool, &self.settings, &self.crawlers, &self.progress)
            .refresh(&self.source.name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_crawler_get_partition_by_values() {
        let crawler = scenario_crawler();
        let partition = crawler
            .get_partition("d", "t1", &["2".to_string()])
            .await
            .unwrap();
        assert_eq!(partition.value, "day=2");
        assert!(crawler.get_partition("d", "t1", &["9".to_string()]).await.is_err());
        assert_eq!(crawler.open_count(), 0);
    }
}
