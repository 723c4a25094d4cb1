//! Catalog Migrator
//! Web API Server

use anyhow::Context;
use catalog_migrator::{api, db, services, settings::Settings, utils::crypto};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_migrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Catalog Migrator Web Server...");

    let settings = Settings::load().context("Failed to load settings")?;
    crypto::init_key(&settings.security.encryption_key);

    // 初始化数据库
    let pool = db::init_database(&settings.database)
        .await
        .context("Failed to initialize database")?;

    tracing::info!("Database initialized successfully");

    let ids = services::IdAllocator::load(&pool).await?;

    // 具体的元数据抓取实现由部署方注册
    let crawlers = services::CrawlerRegistry::new();
    if crawlers.is_empty() {
        tracing::warn!("No metadata crawler registered, refresh requests will fail");
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = api::AppState::new(pool, settings, ids, crawlers);
    let app = api::create_router(state);

    tracing::info!("Server listening on {}", addr);
    tracing::info!("API available at http://{}/api", addr);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
