use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 数据源类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceType {
    #[serde(rename = "hive")]
    Hive,
    #[serde(rename = "max_compute")]
    MaxCompute,
    #[serde(rename = "oss")]
    Oss,
}

impl TryFrom<String> for SourceType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        SourceType::from_str(&s).ok_or_else(|| format!("Unknown source_type: {}", s))
    }
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::Hive => "hive",
            SourceType::MaxCompute => "max_compute",
            SourceType::Oss => "oss",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hive" => Some(SourceType::Hive),
            "max_compute" | "odps" => Some(SourceType::MaxCompute),
            "oss" => Some(SourceType::Oss),
            _ => None,
        }
    }
}

/// 数据源元数据初始化状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InitStatus {
    #[serde(rename = "NOT_STARTED")]
    NotStarted,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TryFrom<String> for InitStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "NOT_STARTED" => Ok(InitStatus::NotStarted),
            "RUNNING" => Ok(InitStatus::Running),
            "OK" => Ok(InitStatus::Ok),
            "FAILED" => Ok(InitStatus::Failed),
            _ => Err(format!("Unknown init status: {}", s)),
        }
    }
}

impl InitStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InitStatus::NotStarted => "NOT_STARTED",
            InitStatus::Running => "RUNNING",
            InitStatus::Ok => "OK",
            InitStatus::Failed => "FAILED",
        }
    }
}

/// 数据源配置
///
/// 白名单非空时只保留名单内的库/表，随后再去掉黑名单里的。表名单的元素可以是
/// `db.table`，也可以是 `*.table`（匹配任意库下的同名表）。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    #[serde(default)]
    pub db_whitelist: Vec<String>,
    #[serde(default)]
    pub db_blacklist: Vec<String>,
    #[serde(default)]
    pub table_whitelist: Vec<String>,
    #[serde(default)]
    pub table_blacklist: Vec<String>,
    /// 抓取元数据时的并发数，不填时使用全局配置
    #[serde(default)]
    pub meta_api_concurrency: Option<usize>,
    /// 每个任务最多包含的分区数，不填时使用全局配置
    #[serde(default)]
    pub partition_group_size: Option<usize>,
    /// 交给元数据抓取实现的连接参数（地址、账号等）
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// 数据源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub source_type: SourceType,
    pub config: SourceConfig,
    pub db_num: i64,
    pub table_num: i64,
    pub partition_num: i64,
    pub init_status: InitStatus,
    pub last_update_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 注册数据源的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDataSourceRequest {
    pub name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub config: SourceConfig,
}

/// 刷新进度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshProgressView {
    pub name: String,
    pub running: bool,
    pub progress: f64,
    pub init_status: InitStatus,
}
