use crate::db::{CatalogRepository, DataSourceRepository};
use crate::models::{DataSource, InitStatus, SourceType, TableMeta};
use crate::services::catalog_diff::{self, CatalogDiff, CrawlSnapshot, StoredCatalog};
use crate::services::crawl_pool::CrawlPool;
use crate::services::crawler::{CrawlerRegistry, MetadataCrawler};
use crate::services::progress::{ProgressRegistry, RefreshProgress};
use crate::settings::Settings;
use crate::utils::error::{AppError, Result};
use crate::utils::NameFilter;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

/// 一次刷新写入的行数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub databases_inserted: usize,
    pub databases_updated: usize,
    pub tables_inserted: usize,
    pub tables_updated: usize,
    pub partitions_inserted: usize,
    pub partitions_updated: usize,
}

impl RefreshSummary {
    fn from_diff(diff: &CatalogDiff) -> Self {
        Self {
            databases_inserted: diff.new_databases.len(),
            databases_updated: diff.updated_databases.len(),
            tables_inserted: diff.new_tables.len(),
            tables_updated: diff.updated_tables.len(),
            partitions_inserted: diff.new_partitions.len(),
            partitions_updated: diff.updated_partitions.len(),
        }
    }
}

/// 目录同步：抓取 -> 聚合 -> 比对 -> 落库
pub struct CatalogSynchronizer<'a> {
    pool: &'a SqlitePool,
    settings: &'a Settings,
    crawlers: &'a CrawlerRegistry,
    progress: &'a Arc<ProgressRegistry>,
}

impl<'a> CatalogSynchronizer<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        settings: &'a Settings,
        crawlers: &'a CrawlerRegistry,
        progress: &'a Arc<ProgressRegistry>,
    ) -> Self {
        Self {
            pool,
            settings,
            crawlers,
            progress,
        }
    }

    /// 刷新一个数据源的目录
    ///
    /// 抓取阶段任何错误都会中止刷新，不写入任何东西。落库分成三个事务（更新、新库和新表、
    /// 新分区），后面的事务失败时前面已提交的不会回滚。
    pub async fn refresh(&self, name: &str) -> Result<RefreshSummary> {
        let sources = DataSourceRepository::new(self.pool);
        let source = sources.find_by_name(name).await?;

        let guard = self.progress.start(name)?;
        let crawler = self.crawlers.create(source.source_type)?;

        tracing::info!("Refreshing catalog of data source {}", name);
        sources.set_init_status(source.id, InitStatus::Running).await?;

        let result = match crawler.open(&source.config).await {
            Ok(()) => self.run(&source, crawler.clone(), guard.progress()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = crawler.close().await {
            tracing::warn!("Failed to close metadata crawler of {}: {}", name, e);
        }

        match result {
            Ok(summary) => {
                sources.set_init_status(source.id, InitStatus::Ok).await?;
                guard.progress().mark(RefreshProgress::COMPLETE);
                tracing::info!("Refreshed catalog of data source {}: {:?}", name, summary);
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Failed to refresh catalog of data source {}: {}", name, e);
                if let Err(status_err) = sources.set_init_status(source.id, InitStatus::Failed).await {
                    tracing::error!("Failed to mark data source {} as failed: {}", name, status_err);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        source: &DataSource,
        crawler: Arc<dyn MetadataCrawler>,
        progress: &Arc<RefreshProgress>,
    ) -> Result<RefreshSummary> {
        let concurrency = source
            .config
            .meta_api_concurrency
            .unwrap_or(self.settings.crawl.concurrency);
        let pool = CrawlPool::new(crawler, concurrency, self.settings.crawl.call_timeout());

        let snapshot = crawl(source, &pool, progress).await;
        pool.shutdown();
        let snapshot = snapshot?;

        let crawled = catalog_diff::aggregate(
            source.id,
            snapshot,
            source.source_type == SourceType::Hive,
        )?;
        let (db_num, table_num, partition_num) = (
            crawled.databases.len() as i64,
            crawled.tables.len() as i64,
            crawled.partitions.len() as i64,
        );

        let stored = self.load_stored(source.id).await?;
        let diff = catalog_diff::diff(crawled, stored);
        let summary = RefreshSummary::from_diff(&diff);

        tracing::info!(
            "Catalog diff of {}: {} new / {} updated databases, {} new / {} updated tables, {} new / {} updated partitions",
            source.name,
            summary.databases_inserted,
            summary.databases_updated,
            summary.tables_inserted,
            summary.tables_updated,
            summary.partitions_inserted,
            summary.partitions_updated
        );

        self.persist(source.id, diff).await?;

        DataSourceRepository::new(self.pool)
            .update_stats(source.id, db_num, table_num, partition_num, Utc::now())
            .await?;

        Ok(summary)
    }

    async fn load_stored(&self, source_id: i64) -> Result<StoredCatalog> {
        let repo = CatalogRepository::new(self.pool);
        Ok(StoredCatalog {
            databases: repo.list_databases(source_id).await?,
            tables: repo.list_tables(source_id).await?,
            partitions: repo.list_partitions(source_id).await?,
        })
    }

    async fn persist(&self, source_id: i64, diff: CatalogDiff) -> Result<()> {
        let CatalogDiff {
            new_databases,
            updated_databases,
            mut new_tables,
            updated_tables,
            mut new_partitions,
            updated_partitions,
        } = diff;

        if !(updated_databases.is_empty() && updated_tables.is_empty() && updated_partitions.is_empty()) {
            let mut tx = self.pool.begin().await?;
            CatalogRepository::batch_update_databases(&mut tx, &updated_databases).await?;
            CatalogRepository::batch_update_tables(&mut tx, &updated_tables).await?;
            CatalogRepository::batch_update_partitions(&mut tx, &updated_partitions).await?;
            tx.commit().await?;
        }

        if new_databases.is_empty() && new_tables.is_empty() && new_partitions.is_empty() {
            return Ok(());
        }

        // 新表需要库 id，新分区需要表 id，插入后回查标识到 id 的映射
        let mut tx = self.pool.begin().await?;
        CatalogRepository::batch_insert_databases(&mut tx, &new_databases).await?;
        let db_ids = CatalogRepository::database_ids(&mut tx, source_id).await?;
        for table in &mut new_tables {
            table.db_id = lookup_id(&db_ids, &table.db_name, "database")?;
        }
        CatalogRepository::batch_insert_tables(&mut tx, &new_tables).await?;
        let table_ids = CatalogRepository::table_ids(&mut tx, source_id).await?;
        tx.commit().await?;

        for partition in &mut new_partitions {
            let (table_id, db_id) = table_ids.get(&partition.table_key()).copied().ok_or_else(|| {
                AppError::Consistency(format!(
                    "table {}.{} of partition {} was not persisted",
                    partition.db_name, partition.table_name, partition.value
                ))
            })?;
            partition.table_id = table_id;
            partition.db_id = db_id;
        }

        let mut tx = self.pool.begin().await?;
        CatalogRepository::batch_insert_partitions(
            &mut tx,
            &new_partitions,
            self.settings.crawl.partition_insert_batch,
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }
}

fn lookup_id(ids: &HashMap<String, i64>, name: &str, what: &str) -> Result<i64> {
    ids.get(name)
        .copied()
        .ok_or_else(|| AppError::Consistency(format!("{} {} was not persisted", what, name)))
}

/// 库 -> 表 -> 分区 三个阶段依次抓取，阶段之间不重叠
async fn crawl(
    source: &DataSource,
    pool: &CrawlPool,
    progress: &Arc<RefreshProgress>,
) -> Result<CrawlSnapshot> {
    let db_filter = NameFilter::new(&source.config.db_whitelist, &source.config.db_blacklist);
    let table_filter =
        NameFilter::new(&source.config.table_whitelist, &source.config.table_blacklist);

    let db_names = db_filter.filter_databases(pool.crawler().list_database_names().await?);
    tracing::info!("Crawling {} databases of {}", db_names.len(), source.name);

    let databases = pool
        .fan_out(db_names.clone(), |crawler, name: String| async move {
            crawler.get_database(&name).await
        })
        .await?;
    progress.mark(RefreshProgress::DATABASES_DONE);

    let mut tables: Vec<TableMeta> = Vec::new();
    let db_step = RefreshProgress::step(
        RefreshProgress::DATABASES_DONE,
        RefreshProgress::TABLES_DONE,
        db_names.len(),
    );
    for db in &db_names {
        let table_names = table_filter.filter_tables(db, pool.crawler().list_table_names(db).await?);
        tracing::debug!("Crawling {} tables of {}.{}", table_names.len(), source.name, db);

        let inputs: Vec<(String, String)> = table_names
            .into_iter()
            .map(|t| (db.clone(), t))
            .collect();
        let fetched = pool
            .fan_out(inputs, |crawler, (db, table): (String, String)| async move {
                crawler.get_table(&db, &table).await
            })
            .await?;
        tables.extend(fetched);
        progress.advance(db_step);
    }
    progress.mark(RefreshProgress::TABLES_DONE);

    let partitioned: Vec<(String, String)> = tables
        .iter()
        .filter(|t| t.has_partitions)
        .map(|t| (t.db_name.clone(), t.name.clone()))
        .collect();
    let table_step = RefreshProgress::step(
        RefreshProgress::TABLES_DONE,
        RefreshProgress::PARTITIONS_DONE,
        partitioned.len(),
    );
    tracing::info!("Crawling partitions of {} tables of {}", partitioned.len(), source.name);

    let partition_lists = pool
        .fan_out(partitioned, |crawler, (db, table): (String, String)| {
            let progress = progress.clone();
            async move {
                let partitions = crawler.list_partitions(&db, &table).await?;
                progress.advance(table_step);
                Ok(partitions)
            }
        })
        .await?;
    progress.mark(RefreshProgress::PARTITIONS_DONE);

    Ok(CrawlSnapshot {
        databases,
        tables,
        partitions: partition_lists.into_iter().flatten().collect(),
    })
}
