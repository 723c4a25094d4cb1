use crate::models::{DatabaseMeta, PartitionMeta, SourceConfig, SourceType, TableMeta};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// 元数据抓取接口，每种数据源各有一份实现
///
/// 同一个实例会被并发调用，实现需要自己处理内部状态的同步。
#[async_trait]
pub trait MetadataCrawler: Send + Sync {
    async fn open(&self, config: &SourceConfig) -> Result<()>;

    async fn close(&self) -> Result<()>;

    async fn list_database_names(&self) -> Result<Vec<String>>;

    async fn get_database(&self, name: &str) -> Result<DatabaseMeta>;

    async fn list_table_names(&self, db: &str) -> Result<Vec<String>>;

    async fn get_table(&self, db: &str, table: &str) -> Result<TableMeta>;

    async fn list_partitions(&self, db: &str, table: &str) -> Result<Vec<PartitionMeta>>;

    async fn get_partition(&self, db: &str, table: &str, values: &[String]) -> Result<PartitionMeta>;

    /// 配置不可用时返回错误
    async fn check_config(&self, config: &SourceConfig) -> Result<()>;
}

/// 每次刷新都通过工厂拿一个新的抓取实例
pub trait CrawlerFactory: Send + Sync {
    fn create(&self) -> Arc<dyn MetadataCrawler>;
}

impl<F> CrawlerFactory for F
where
    F: Fn() -> Arc<dyn MetadataCrawler> + Send + Sync,
{
    fn create(&self) -> Arc<dyn MetadataCrawler> {
        self()
    }
}

/// 数据源类型 -> 抓取实现
#[derive(Default, Clone)]
pub struct CrawlerRegistry {
    factories: HashMap<SourceType, Arc<dyn CrawlerFactory>>,
}

impl CrawlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source_type: SourceType, factory: Arc<dyn CrawlerFactory>) {
        tracing::info!("Registered metadata crawler for {}", source_type.as_str());
        self.factories.insert(source_type, factory);
    }

    pub fn create(&self, source_type: SourceType) -> Result<Arc<dyn MetadataCrawler>> {
        self.factories
            .get(&source_type)
            .map(|factory| factory.create())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "No metadata crawler registered for source type {}",
                    source_type.as_str()
                ))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
