use crate::utils::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "CATALOG_MIGRATOR";
const CONFIG_FILE_ENV: &str = "CATALOG_MIGRATOR_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub crawl: CrawlSettings,
    pub job: JobSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 为空时使用本地数据目录下的 SQLite 文件
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSettings {
    /// 元数据抓取的默认并发数
    pub concurrency: usize,
    /// 新分区每批插入的行数
    pub partition_insert_batch: usize,
    /// 单次元数据调用的超时秒数，0 表示不限
    pub call_timeout_secs: u64,
}

impl CrawlSettings {
    pub fn call_timeout(&self) -> Option<std::time::Duration> {
        (self.call_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.call_timeout_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSettings {
    pub partition_group_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    pub encryption_key: String,
}

impl Settings {
    /// 按 默认值 -> config/default.toml -> $CATALOG_MIGRATOR_CONFIG -> 环境变量 的顺序叠加
    pub fn load() -> Result<Self> {
        let mut builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false));

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("crawl.concurrency", 10)?
            .set_default("crawl.partition_insert_batch", 500)?
            .set_default("crawl.call_timeout_secs", 0)?
            .set_default("job.partition_group_size", 50)?
            .set_default("security.encryption_key", "catalog_migrator_default_key_32b")?)
    }
}

#[cfg(test)]
impl Settings {
    pub fn for_tests() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseSettings {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            crawl: CrawlSettings {
                concurrency: 4,
                partition_insert_batch: 2,
                call_timeout_secs: 0,
            },
            job: JobSettings {
                partition_group_size: 50,
            },
            security: SecuritySettings {
                encryption_key: "catalog_migrator_test_key".to_string(),
            },
        }
    }
}
