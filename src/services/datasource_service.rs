use crate::db::DataSourceRepository;
use crate::models::{CreateDataSourceRequest, DataSource, InitStatus, RefreshProgressView, SourceConfig};
use crate::services::crawler::CrawlerRegistry;
use crate::services::progress::ProgressRegistry;
use crate::utils::error::{AppError, Result};
use sqlx::SqlitePool;

/// 数据源服务
pub struct DataSourceService<'a> {
    pool: &'a SqlitePool,
    crawlers: &'a CrawlerRegistry,
}

impl<'a> DataSourceService<'a> {
    pub fn new(pool: &'a SqlitePool, crawlers: &'a CrawlerRegistry) -> Self {
        Self { pool, crawlers }
    }

    /// 注册数据源，先让抓取实现校验配置
    pub async fn register(&self, req: CreateDataSourceRequest) -> Result<DataSource> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Data source name must not be empty".to_string()));
        }
        validate_config(&req.config)?;

        let repo = DataSourceRepository::new(self.pool);
        if repo.exists(name).await? {
            return Err(AppError::InvalidInput(format!(
                "Data source {} already exists",
                name
            )));
        }

        self.crawlers
            .create(req.source_type)?
            .check_config(&req.config)
            .await?;

        let req = CreateDataSourceRequest {
            name: name.to_string(),
            ..req
        };
        let id = repo.insert(&req).await?;
        tracing::info!(
            "Registered data source {} ({}) with id {}",
            req.name,
            req.source_type.as_str(),
            id
        );

        repo.find_by_name(&req.name).await
    }

    pub async fn update_config(&self, name: &str, config: SourceConfig) -> Result<DataSource> {
        validate_config(&config)?;
        let repo = DataSourceRepository::new(self.pool);
        let source = repo.find_by_name(name).await?;

        self.crawlers
            .create(source.source_type)?
            .check_config(&config)
            .await?;

        repo.update_config(source.id, &config).await?;
        tracing::info!("Updated config of data source {}", name);

        repo.find_by_name(name).await
    }

    pub async fn list(&self) -> Result<Vec<DataSource>> {
        DataSourceRepository::new(self.pool).find_all().await
    }

    pub async fn get(&self, name: &str) -> Result<DataSource> {
        DataSourceRepository::new(self.pool).find_by_name(name).await
    }

    /// 刷新进度，百分比保留两位小数；没有刷新在跑时按上次结果给 0 或 100
    pub async fn refresh_progress(
        &self,
        name: &str,
        progress: &ProgressRegistry,
    ) -> Result<RefreshProgressView> {
        let source = self.get(name).await?;
        let running = progress.get(name);

        let percentage = match running {
            Some(p) => p,
            None if source.init_status == InitStatus::Ok => 100.0,
            None => 0.0,
        };

        Ok(RefreshProgressView {
            name: source.name,
            running: running.is_some(),
            progress: percentage,
            init_status: source.init_status,
        })
    }
}

fn validate_config(config: &SourceConfig) -> Result<()> {
    if config.meta_api_concurrency == Some(0) {
        return Err(AppError::InvalidInput(
            "meta_api_concurrency must be greater than 0".to_string(),
        ));
    }
    if config.partition_group_size == Some(0) {
        return Err(AppError::InvalidInput(
            "partition_group_size must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
