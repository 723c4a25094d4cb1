use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::task::TaskType;

/// 作业范围
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobType {
    #[serde(rename = "database")]
    Database,
    #[serde(rename = "tables")]
    Tables,
    #[serde(rename = "partitions")]
    Partitions,
}

impl TryFrom<String> for JobType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "database" => Ok(JobType::Database),
            "tables" => Ok(JobType::Tables),
            "partitions" => Ok(JobType::Partitions),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::Database => "database",
            JobType::Tables => "tables",
            JobType::Partitions => "partitions",
        }
    }
}

fn default_increment() -> bool {
    true
}

/// 作业配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    /// 不填时取数据源类型对应的默认任务类型
    #[serde(default)]
    pub task_type: Option<TaskType>,
    /// tables 作业要迁移的表名
    #[serde(default)]
    pub tables: Vec<String>,
    /// partitions 作业要迁移的分区 id
    #[serde(default)]
    pub partitions: Vec<i64>,
    #[serde(default)]
    pub table_whitelist: Vec<String>,
    #[serde(default)]
    pub table_blacklist: Vec<String>,
    /// 表名 -> 分区过滤表达式，例如 `day >= '20240101' and hour = '00'`
    #[serde(default)]
    pub partition_filters: HashMap<String, String>,
    /// 跳过已经迁移完成的分区
    #[serde(default = "default_increment")]
    pub increment: bool,
    #[serde(default)]
    pub partition_group_size: Option<usize>,
    #[serde(default)]
    pub max_partition_size_gb: Option<f64>,
    /// 源表名 -> 目标表名
    #[serde(default)]
    pub table_mapping: HashMap<String, String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            task_type: None,
            tables: Vec::new(),
            partitions: Vec::new(),
            table_whitelist: Vec::new(),
            table_blacklist: Vec::new(),
            partition_filters: HashMap::new(),
            increment: true,
            partition_group_size: None,
            max_partition_size_gb: None,
            table_mapping: HashMap::new(),
        }
    }
}

/// 提交作业的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub description: Option<String>,
    pub source_name: String,
    pub db_name: String,
    #[serde(default)]
    pub dst_db_name: Option<String>,
    pub job_type: JobType,
    #[serde(default)]
    pub config: JobConfig,
}

/// 迁移作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub description: Option<String>,
    pub source_id: i64,
    pub source_name: String,
    pub db_name: String,
    pub dst_db_name: String,
    pub job_type: JobType,
    pub task_type: TaskType,
    pub config: JobConfig,
    pub stopped: bool,
    pub created_at: DateTime<Utc>,
}
