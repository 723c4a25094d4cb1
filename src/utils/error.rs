use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 元数据服务调用失败，整个刷新中止
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// 抓取到的元数据自相矛盾（例如分区值个数与分区列个数不一致）
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 作业配置错误，调用方需要修改配置后再提交
    #[error("Invalid job config `{field}`: {message}")]
    JobConfig { field: String, message: String },

    #[error("There are no tables found: {0}")]
    NoTablesFound(String),

    /// 已有未结束的任务占用了这些表/分区，稍后重试即可
    #[error("There are tasks those are running or ready to run for {}", .0.join(", "))]
    TaskConflict(Vec<String>),

    #[error("Refresh of data source {0} is already running")]
    RefreshInProgress(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn job_config(field: &str, message: impl Into<String>) -> Self {
        AppError::JobConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// 机器可读的错误类别，HTTP 层会原样返回
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Crawl(_) => "crawl",
            AppError::Consistency(_) => "consistency",
            AppError::Config(_) => "config",
            AppError::JobConfig { .. } => "job_config",
            AppError::NoTablesFound(_) => "no_tables_found",
            AppError::TaskConflict(_) => "task_conflict",
            AppError::RefreshInProgress(_) => "refresh_in_progress",
            AppError::Encryption(_) => "encryption",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Settings(_) => "settings",
            AppError::Worker(_) => "worker",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_lists_tables() {
        let err = AppError::TaskConflict(vec!["d.t1".to_string(), "d.t2".to_string()]);
        assert_eq!(
            err.to_string(),
            "There are tasks those are running or ready to run for d.t1, d.t2"
        );
        assert_eq!(err.kind(), "task_conflict");
    }

    #[test]
    fn test_job_config_message() {
        let err = AppError::job_config("partition_filter", "bad filter");
        assert_eq!(err.to_string(), "Invalid job config `partition_filter`: bad filter");
    }
}
