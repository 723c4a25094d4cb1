use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::MigrationStatus;
use super::datasource::SourceType;

/// 任务类型，决定数据从哪里搬到哪里
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(rename = "hive_to_mc")]
    HiveToMc,
    #[serde(rename = "mc_to_mc")]
    McToMc,
    #[serde(rename = "mc_to_oss")]
    McToOss,
    #[serde(rename = "oss_to_mc")]
    OssToMc,
}

impl TryFrom<String> for TaskType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "hive_to_mc" => Ok(TaskType::HiveToMc),
            "mc_to_mc" => Ok(TaskType::McToMc),
            "mc_to_oss" => Ok(TaskType::McToOss),
            "oss_to_mc" => Ok(TaskType::OssToMc),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::HiveToMc => "hive_to_mc",
            TaskType::McToMc => "mc_to_mc",
            TaskType::McToOss => "mc_to_oss",
            TaskType::OssToMc => "oss_to_mc",
        }
    }

    /// 任务读取的数据源类型
    pub fn source_type(&self) -> SourceType {
        match self {
            TaskType::HiveToMc => SourceType::Hive,
            TaskType::McToMc | TaskType::McToOss => SourceType::MaxCompute,
            TaskType::OssToMc => SourceType::Oss,
        }
    }

    pub fn default_for(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Hive => TaskType::HiveToMc,
            SourceType::MaxCompute => TaskType::McToMc,
            SourceType::Oss => TaskType::OssToMc,
        }
    }
}

/// 粗粒度的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Init,
    Doing,
    Done,
    Failed,
}

/// 任务状态
///
/// 执行器按 schema -> data -> verification 的顺序推进，每个阶段都有
/// doing/done/failed 三种状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Init,
    SchemaDoing,
    SchemaDone,
    SchemaFailed,
    DataDoing,
    DataDone,
    DataFailed,
    VerificationDoing,
    VerificationDone,
    VerificationFailed,
    Done,
}

impl TryFrom<String> for TaskStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        TaskStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown task status: {}", s))
    }
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 11] = [
        TaskStatus::Init,
        TaskStatus::SchemaDoing,
        TaskStatus::SchemaDone,
        TaskStatus::SchemaFailed,
        TaskStatus::DataDoing,
        TaskStatus::DataDone,
        TaskStatus::DataFailed,
        TaskStatus::VerificationDoing,
        TaskStatus::VerificationDone,
        TaskStatus::VerificationFailed,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Init => "init",
            TaskStatus::SchemaDoing => "schema_doing",
            TaskStatus::SchemaDone => "schema_done",
            TaskStatus::SchemaFailed => "schema_failed",
            TaskStatus::DataDoing => "data_doing",
            TaskStatus::DataDone => "data_done",
            TaskStatus::DataFailed => "data_failed",
            TaskStatus::VerificationDoing => "verification_doing",
            TaskStatus::VerificationDone => "verification_done",
            TaskStatus::VerificationFailed => "verification_failed",
            TaskStatus::Done => "done",
        }
    }

    /// 中间阶段的 done 仍然算作进行中，只有最终的 `Done` 才是完成
    pub fn phase(&self) -> TaskPhase {
        match self {
            TaskStatus::Init => TaskPhase::Init,
            TaskStatus::SchemaFailed | TaskStatus::DataFailed | TaskStatus::VerificationFailed => {
                TaskPhase::Failed
            }
            TaskStatus::Done => TaskPhase::Done,
            _ => TaskPhase::Doing,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase() == TaskPhase::Failed
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase(), TaskPhase::Done | TaskPhase::Failed)
    }

    /// 终止状态的字符串，冲突检查的 SQL 用它排除已结束的任务
    pub fn terminal_values() -> Vec<&'static str> {
        TaskStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.as_str())
            .collect()
    }

    /// 分区跟随任务状态变化时应当处于的迁移状态
    pub fn partition_status(&self) -> MigrationStatus {
        match self.phase() {
            TaskPhase::Init => MigrationStatus::Init,
            TaskPhase::Doing => MigrationStatus::Doing,
            TaskPhase::Done => MigrationStatus::Done,
            TaskPhase::Failed => MigrationStatus::Failed,
        }
    }
}

/// 迁移任务：一张表 + 至多 group size 个分区
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub job_id: i64,
    pub source_id: i64,
    pub db_id: i64,
    pub table_id: i64,
    pub db_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub dst_db_name: String,
    pub dst_table_name: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub running: bool,
    pub restart: bool,
    pub stopped: bool,
    /// 为空表示整表（或只迁移表结构）的任务
    pub partitions: Vec<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn full_table_name(&self) -> String {
        format!("{}.{}", self.db_name, self.table_name)
    }
}
