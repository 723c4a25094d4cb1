use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::table::TableSchema;

/// 库/表/分区的迁移状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MigrationStatus {
    #[default]
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "DOING")]
    Doing,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TryFrom<String> for MigrationStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "INIT" => Ok(MigrationStatus::Init),
            "DOING" => Ok(MigrationStatus::Doing),
            "DONE" => Ok(MigrationStatus::Done),
            "FAILED" => Ok(MigrationStatus::Failed),
            _ => Err(format!("Unknown migration status: {}", s)),
        }
    }
}

impl MigrationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MigrationStatus::Init => "INIT",
            MigrationStatus::Doing => "DOING",
            MigrationStatus::Done => "DONE",
            MigrationStatus::Failed => "FAILED",
        }
    }
}

/// 表的名字标识，在拿到存储分配的数字 id 之前用它来匹配新旧两次抓取的同一张表
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub source_id: i64,
    pub db_name: String,
    pub schema_name: String,
    pub table_name: String,
}

impl TableKey {
    pub fn new(source_id: i64, db_name: &str, schema_name: &str, table_name: &str) -> Self {
        Self {
            source_id,
            db_name: db_name.to_string(),
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
        }
    }
}

/// 分区的名字标识：所属表 + 分区值
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub table: TableKey,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Database {
    pub id: i64,
    pub source_id: i64,
    pub name: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub size: Option<i64>,
    pub num_rows: Option<i64>,
    pub last_ddl_time: Option<DateTime<Utc>>,
    pub status: MigrationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub id: i64,
    pub source_id: i64,
    pub db_id: i64,
    pub db_name: String,
    /// 三层模型（db.schema.table）的 schema，没有时为空串
    pub schema_name: String,
    pub name: String,
    pub table_type: Option<String>,
    pub has_partitions: bool,
    pub schema: TableSchema,
    pub owner: Option<String>,
    pub lifecycle: Option<i64>,
    pub size: Option<i64>,
    pub num_rows: Option<i64>,
    pub last_ddl_time: Option<DateTime<Utc>>,
    pub status: MigrationStatus,
}

impl Table {
    pub fn key(&self) -> TableKey {
        TableKey::new(self.source_id, &self.db_name, &self.schema_name, &self.name)
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db_name, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partition {
    pub id: i64,
    pub source_id: i64,
    pub db_id: i64,
    pub table_id: i64,
    pub db_name: String,
    pub schema_name: String,
    pub table_name: String,
    /// `k1=v1/k2=v2` 形式的分区值
    pub value: String,
    pub size: Option<i64>,
    pub num_rows: Option<i64>,
    pub last_ddl_time: Option<DateTime<Utc>>,
    pub status: MigrationStatus,
}

impl Partition {
    pub fn table_key(&self) -> TableKey {
        TableKey::new(self.source_id, &self.db_name, &self.schema_name, &self.table_name)
    }

    pub fn key(&self) -> PartitionKey {
        PartitionKey {
            table: self.table_key(),
            value: self.value.clone(),
        }
    }
}

/// 把 `k1=v1/k2=v2` 拆成 (列名, 值) 列表
pub fn partition_spec(value: &str) -> Vec<(&str, &str)> {
    value
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k, v),
            None => ("", kv),
        })
        .collect()
}

/// 元数据服务返回的库信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseMeta {
    pub name: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub last_ddl_time: Option<DateTime<Utc>>,
}

/// 元数据服务返回的表信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMeta {
    pub db_name: String,
    #[serde(default)]
    pub schema_name: String,
    pub name: String,
    pub table_type: Option<String>,
    pub schema: TableSchema,
    pub has_partitions: bool,
    pub owner: Option<String>,
    pub lifecycle: Option<i64>,
    pub size: Option<i64>,
    pub num_rows: Option<i64>,
    pub last_ddl_time: Option<DateTime<Utc>>,
}

/// 元数据服务返回的分区信息，`value` 可能是 `v1/v2` 形式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub db_name: String,
    #[serde(default)]
    pub schema_name: String,
    pub table_name: String,
    pub value: String,
    pub size: Option<i64>,
    pub num_rows: Option<i64>,
    pub last_ddl_time: Option<DateTime<Utc>>,
}
