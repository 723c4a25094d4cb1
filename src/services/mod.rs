pub mod catalog_diff;
pub mod catalog_sync;
pub mod crawl_pool;
pub mod crawler;
pub mod datasource_service;
pub mod id_allocator;
pub mod job_submitter;
pub mod progress;
pub mod task_lifecycle;

pub use catalog_sync::{CatalogSynchronizer, RefreshSummary};
pub use crawler::{CrawlerFactory, CrawlerRegistry, MetadataCrawler};
pub use datasource_service::DataSourceService;
pub use id_allocator::IdAllocator;
pub use job_submitter::JobSubmitter;
pub use progress::ProgressRegistry;
pub use task_lifecycle::TaskLifecycle;
