use serde::{Deserialize, Serialize};

/// 表的列信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            comment: None,
        }
    }
}

/// 表结构：普通列 + 分区列
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub partition_columns: Vec<Column>,
}

impl TableSchema {
    pub fn partition_column_names(&self) -> Vec<&str> {
        self.partition_columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn partition_column_type(&self, name: &str) -> Option<&str> {
        self.partition_columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.data_type.as_str())
    }
}
