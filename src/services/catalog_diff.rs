//! 抓取结果的聚合以及和已存目录的比对，全部是纯函数

use crate::models::{
    Database, DatabaseMeta, MigrationStatus, Partition, PartitionKey, PartitionMeta, Table,
    TableKey, TableMeta,
};
use crate::utils::error::{AppError, Result};
use std::collections::{HashMap, HashSet};

/// 一次抓取得到的原始元数据
#[derive(Debug, Default, Clone)]
pub struct CrawlSnapshot {
    pub databases: Vec<DatabaseMeta>,
    pub tables: Vec<TableMeta>,
    pub partitions: Vec<PartitionMeta>,
}

/// 聚合后的目录，还没有存储分配的 id
#[derive(Debug, Default, Clone)]
pub struct CrawledCatalog {
    pub databases: Vec<Database>,
    pub tables: Vec<Table>,
    pub partitions: Vec<Partition>,
}

/// 存储里已有的目录
#[derive(Debug, Default, Clone)]
pub struct StoredCatalog {
    pub databases: Vec<Database>,
    pub tables: Vec<Table>,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Default, Clone)]
pub struct CatalogDiff {
    pub new_databases: Vec<Database>,
    pub updated_databases: Vec<Database>,
    pub new_tables: Vec<Table>,
    pub updated_tables: Vec<Table>,
    pub new_partitions: Vec<Partition>,
    pub updated_partitions: Vec<Partition>,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.new_databases.is_empty()
            && self.updated_databases.is_empty()
            && self.new_tables.is_empty()
            && self.updated_tables.is_empty()
            && self.new_partitions.is_empty()
            && self.updated_partitions.is_empty()
    }
}

/// 组装实体并自底向上汇总大小和行数
///
/// `positional_values` 为 true 时（Hive），不含 `=` 的分区值按表的分区列名改写成
/// `k1=v1/k2=v2`，值的个数和分区列个数不一致视为元数据不一致。
pub fn aggregate(
    source_id: i64,
    snapshot: CrawlSnapshot,
    positional_values: bool,
) -> Result<CrawledCatalog> {
    let mut tables: Vec<Table> = snapshot
        .tables
        .into_iter()
        .map(|meta| Table {
            id: 0,
            source_id,
            db_id: 0,
            db_name: meta.db_name,
            schema_name: meta.schema_name,
            name: meta.name,
            table_type: meta.table_type,
            has_partitions: meta.has_partitions,
            schema: meta.schema,
            owner: meta.owner,
            lifecycle: meta.lifecycle,
            size: meta.size,
            num_rows: meta.num_rows,
            last_ddl_time: meta.last_ddl_time,
            status: MigrationStatus::Init,
        })
        .collect();

    let table_index: HashMap<TableKey, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.key(), i))
        .collect();

    let mut partition_sums: HashMap<usize, (i64, i64)> = HashMap::new();
    let mut partitions = Vec::with_capacity(snapshot.partitions.len());

    for meta in snapshot.partitions {
        let key = TableKey::new(source_id, &meta.db_name, &meta.schema_name, &meta.table_name);
        let idx = *table_index.get(&key).ok_or_else(|| {
            AppError::Consistency(format!(
                "partition {} belongs to unknown table {}.{}",
                meta.value, meta.db_name, meta.table_name
            ))
        })?;
        let table = &tables[idx];

        let value = if positional_values && !meta.value.contains('=') {
            normalize_positional(table, &meta.value)?
        } else {
            meta.value
        };

        let sums = partition_sums.entry(idx).or_insert((0, 0));
        sums.0 += meta.size.unwrap_or(0);
        sums.1 += meta.num_rows.unwrap_or(0);

        partitions.push(Partition {
            id: 0,
            source_id,
            db_id: 0,
            table_id: 0,
            db_name: meta.db_name,
            schema_name: meta.schema_name,
            table_name: meta.table_name,
            value,
            size: meta.size,
            num_rows: meta.num_rows,
            last_ddl_time: meta.last_ddl_time,
            status: MigrationStatus::Init,
        });
    }

    for (idx, table) in tables.iter_mut().enumerate() {
        if table.has_partitions {
            let (size, rows) = partition_sums.get(&idx).copied().unwrap_or((0, 0));
            table.size = Some(size);
            table.num_rows = Some(rows);
        }
    }

    let mut db_sums: HashMap<&str, (i64, i64)> = HashMap::new();
    for table in &tables {
        let sums = db_sums.entry(table.db_name.as_str()).or_insert((0, 0));
        sums.0 += table.size.unwrap_or(0);
        sums.1 += table.num_rows.unwrap_or(0);
    }

    let databases = snapshot
        .databases
        .into_iter()
        .map(|meta| {
            let (size, rows) = db_sums.get(meta.name.as_str()).copied().unwrap_or((0, 0));
            Database {
                id: 0,
                source_id,
                name: meta.name,
                owner: meta.owner,
                description: meta.description,
                location: meta.location,
                size: Some(size),
                num_rows: Some(rows),
                last_ddl_time: meta.last_ddl_time,
                status: MigrationStatus::Init,
            }
        })
        .collect();

    Ok(CrawledCatalog {
        databases,
        tables,
        partitions,
    })
}

fn normalize_positional(table: &Table, value: &str) -> Result<String> {
    let names = table.schema.partition_column_names();
    let values: Vec<&str> = value.split('/').collect();

    if names.len() != values.len() {
        return Err(AppError::Consistency(format!(
            "partition value {} of {} has {} values but the table has {} partition columns",
            value,
            table.full_name(),
            values.len(),
            names.len()
        )));
    }

    Ok(names
        .iter()
        .zip(values.iter())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("/"))
}

/// 按名字标识比对新旧目录
///
/// 更新的实体保留已存的 id 和迁移状态，其余字段取新值。分区有变化时，所属的表和库也
/// 记为更新。
pub fn diff(crawled: CrawledCatalog, stored: StoredCatalog) -> CatalogDiff {
    let mut result = CatalogDiff::default();

    let stored_partitions: HashMap<PartitionKey, Partition> = stored
        .partitions
        .into_iter()
        .map(|p| (p.key(), p))
        .collect();
    let mut touched_tables: HashSet<TableKey> = HashSet::new();

    for partition in crawled.partitions {
        match stored_partitions.get(&partition.key()) {
            None => result.new_partitions.push(partition),
            Some(old) => {
                if old.size != partition.size
                    || old.num_rows != partition.num_rows
                    || old.last_ddl_time != partition.last_ddl_time
                {
                    tracing::debug!(
                        "Partition {}.{}/{} changed",
                        partition.db_name,
                        partition.table_name,
                        partition.value
                    );
                    touched_tables.insert(partition.table_key());
                    let mut updated = old.clone();
                    updated.size = partition.size;
                    updated.num_rows = partition.num_rows;
                    updated.last_ddl_time = partition.last_ddl_time;
                    result.updated_partitions.push(updated);
                }
            }
        }
    }

    let stored_tables: HashMap<TableKey, Table> =
        stored.tables.into_iter().map(|t| (t.key(), t)).collect();
    let mut touched_dbs: HashSet<String> = HashSet::new();

    for table in crawled.tables {
        let key = table.key();
        match stored_tables.get(&key) {
            None => result.new_tables.push(table),
            Some(old) => {
                let changed = old.size != table.size
                    || old.num_rows != table.num_rows
                    || old.last_ddl_time != table.last_ddl_time
                    || old.lifecycle != table.lifecycle
                    || old.schema != table.schema;
                if changed || touched_tables.contains(&key) {
                    tracing::debug!("Table {} changed", table.full_name());
                    touched_dbs.insert(table.db_name.clone());
                    let mut updated = old.clone();
                    updated.table_type = table.table_type;
                    updated.has_partitions = table.has_partitions;
                    updated.schema = table.schema;
                    updated.owner = table.owner;
                    updated.lifecycle = table.lifecycle;
                    updated.size = table.size;
                    updated.num_rows = table.num_rows;
                    updated.last_ddl_time = table.last_ddl_time;
                    result.updated_tables.push(updated);
                }
            }
        }
    }

    let stored_dbs: HashMap<String, Database> = stored
        .databases
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect();

    for db in crawled.databases {
        match stored_dbs.get(&db.name) {
            None => result.new_databases.push(db),
            Some(old) => {
                let changed = old.size != db.size
                    || old.num_rows != db.num_rows
                    || old.last_ddl_time != db.last_ddl_time;
                if changed || touched_dbs.contains(&db.name) {
                    tracing::debug!("Database {} changed", db.name);
                    let mut updated = old.clone();
                    updated.owner = db.owner;
                    updated.description = db.description;
                    updated.location = db.location;
                    updated.size = db.size;
                    updated.num_rows = db.num_rows;
                    updated.last_ddl_time = db.last_ddl_time;
                    result.updated_databases.push(updated);
                }
            }
        }
    }

    result
}
