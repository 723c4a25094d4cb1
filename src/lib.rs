//! Catalog Migrator
//! 数据湖元数据同步与迁移任务生成

pub mod api;
pub mod db;
pub mod models;
pub mod services;
pub mod settings;
pub mod utils;

#[cfg(test)]
pub mod test_support;
