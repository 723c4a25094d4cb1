use crate::models::{
    CreateDataSourceRequest, DataSource, Database, InitStatus, MigrationStatus, Partition,
    SourceConfig, SourceType, Table, TableKey, TableSchema,
};
use crate::utils::crypto;
use crate::utils::error::{AppError, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use super::MAX_BIND_PARAMS;

/// 库、表批量写入时每条语句的行数
const INSERT_CHUNK: usize = 500;

/// id 列表查询时每条语句的 id 个数
pub(crate) const ID_CHUNK: usize = 900;

/// 数据源仓库
pub struct DataSourceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DataSourceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// 保存数据源，配置加密后落库
    pub async fn insert(&self, req: &CreateDataSourceRequest) -> Result<i64> {
        let encrypted_config = crypto::encrypt_json(&req.config)?;

        let result = sqlx::query(
            r#"
            INSERT INTO data_source (name, source_type, config, init_status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.source_type.as_str())
        .bind(&encrypted_config)
        .bind(InitStatus::NotStarted.as_str())
        .bind(Utc::now())
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_source WHERE name = ?")
            .bind(name)
            .fetch_one(self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn find_all(&self) -> Result<Vec<DataSource>> {
        let rows = sqlx::query_as::<_, DataSourceRow>(
            "SELECT id, name, source_type, config, db_num, table_num, partition_num, init_status, last_update_time, created_at FROM data_source ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    pub async fn find_by_name(&self, name: &str) -> Result<DataSource> {
        let row = sqlx::query_as::<_, DataSourceRow>(
            "SELECT id, name, source_type, config, db_num, table_num, partition_num, init_status, last_update_time, created_at FROM data_source WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Data source {} not found", name)))?;

        row.try_into()
    }

    pub async fn update_config(&self, id: i64, config: &SourceConfig) -> Result<()> {
        let encrypted_config = crypto::encrypt_json(config)?;

        sqlx::query("UPDATE data_source SET config = ? WHERE id = ?")
            .bind(&encrypted_config)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_init_status(&self, id: i64, status: InitStatus) -> Result<()> {
        sqlx::query("UPDATE data_source SET init_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// 刷新结束后回写聚合计数和刷新时间
    pub async fn update_stats(
        &self,
        id: i64,
        db_num: i64,
        table_num: i64,
        partition_num: i64,
        last_update_time: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE data_source
            SET db_num = ?, table_num = ?, partition_num = ?, last_update_time = ?
            WHERE id = ?
            "#,
        )
        .bind(db_num)
        .bind(table_num)
        .bind(partition_num)
        .bind(last_update_time)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

const DB_COLUMNS: &str =
    "id, source_id, name, owner, description, location, size, num_rows, last_ddl_time, status";
const TABLE_COLUMNS: &str = "id, source_id, db_id, db_name, schema_name, name, table_type, has_partitions, table_schema, owner, lifecycle, size, num_rows, last_ddl_time, status";
const PARTITION_COLUMNS: &str = "id, source_id, db_id, table_id, db_name, schema_name, table_name, value, size, num_rows, last_ddl_time, status";

/// 库/表/分区元数据仓库
pub struct CatalogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CatalogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_databases(&self, source_id: i64) -> Result<Vec<Database>> {
        let rows = sqlx::query_as::<_, DatabaseRow>(&format!(
            "SELECT {} FROM db WHERE source_id = ? ORDER BY id",
            DB_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    pub async fn find_database(&self, source_id: i64, name: &str) -> Result<Database> {
        let row = sqlx::query_as::<_, DatabaseRow>(&format!(
            "SELECT {} FROM db WHERE source_id = ? AND name = ?",
            DB_COLUMNS
        ))
        .bind(source_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Database {} not found", name)))?;

        row.try_into()
    }

    pub async fn list_tables(&self, source_id: i64) -> Result<Vec<Table>> {
        let rows = sqlx::query_as::<_, TableRow>(&format!(
            "SELECT {} FROM catalog_table WHERE source_id = ? ORDER BY id",
            TABLE_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    pub async fn list_tables_by_db(&self, db_id: i64) -> Result<Vec<Table>> {
        let rows = sqlx::query_as::<_, TableRow>(&format!(
            "SELECT {} FROM catalog_table WHERE db_id = ? ORDER BY name",
            TABLE_COLUMNS
        ))
        .bind(db_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    pub async fn find_tables_by_ids(&self, ids: &[i64]) -> Result<Vec<Table>> {
        let mut tables = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM catalog_table WHERE id IN (",
                TABLE_COLUMNS
            ));
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows = qb.build_query_as::<TableRow>().fetch_all(self.pool).await?;
            for row in rows {
                tables.push(row.try_into()?);
            }
        }
        Ok(tables)
    }

    pub async fn list_partitions(&self, source_id: i64) -> Result<Vec<Partition>> {
        let rows = sqlx::query_as::<_, PartitionRow>(&format!(
            "SELECT {} FROM catalog_partition WHERE source_id = ? ORDER BY id",
            PARTITION_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    /// 按抓取（插入）顺序返回表的分区
    pub async fn list_partitions_by_table(&self, table_id: i64) -> Result<Vec<Partition>> {
        let rows = sqlx::query_as::<_, PartitionRow>(&format!(
            "SELECT {} FROM catalog_partition WHERE table_id = ? ORDER BY id",
            PARTITION_COLUMNS
        ))
        .bind(table_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    /// 按 id 查分区，结果顺序与传入顺序一致，不存在的 id 被跳过
    pub async fn find_partitions_by_ids(&self, ids: &[i64]) -> Result<Vec<Partition>> {
        let mut by_id = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM catalog_partition WHERE id IN (",
                PARTITION_COLUMNS
            ));
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows = qb
                .build_query_as::<PartitionRow>()
                .fetch_all(self.pool)
                .await?;
            for row in rows {
                let partition: Partition = row.try_into()?;
                by_id.insert(partition.id, partition);
            }
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// 库名 -> 库 id
    pub async fn database_ids(conn: &mut SqliteConnection, source_id: i64) -> Result<HashMap<String, i64>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM db WHERE source_id = ?")
                .bind(source_id)
                .fetch_all(&mut *conn)
                .await?;

        Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
    }

    /// 表标识 -> (表 id, 库 id)，批量插入后用它回填新表的 id
    pub async fn table_ids(
        conn: &mut SqliteConnection,
        source_id: i64,
    ) -> Result<HashMap<TableKey, (i64, i64)>> {
        let rows: Vec<(i64, i64, String, String, String)> = sqlx::query_as(
            "SELECT id, db_id, db_name, schema_name, name FROM catalog_table WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, db_id, db_name, schema_name, name)| {
                (
                    TableKey::new(source_id, &db_name, &schema_name, &name),
                    (id, db_id),
                )
            })
            .collect())
    }

    pub async fn batch_update_databases(conn: &mut SqliteConnection, dbs: &[Database]) -> Result<()> {
        for db in dbs {
            sqlx::query(
                r#"
                UPDATE db
                SET owner = ?, description = ?, location = ?, size = ?, num_rows = ?, last_ddl_time = ?
                WHERE id = ?
                "#,
            )
            .bind(&db.owner)
            .bind(&db.description)
            .bind(&db.location)
            .bind(db.size)
            .bind(db.num_rows)
            .bind(db.last_ddl_time)
            .bind(db.id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn batch_update_tables(conn: &mut SqliteConnection, tables: &[Table]) -> Result<()> {
        for table in tables {
            let schema_json = serde_json::to_string(&table.schema)?;
            sqlx::query(
                r#"
                UPDATE catalog_table
                SET table_type = ?, has_partitions = ?, table_schema = ?, owner = ?, lifecycle = ?,
                    size = ?, num_rows = ?, last_ddl_time = ?
                WHERE id = ?
                "#,
            )
            .bind(&table.table_type)
            .bind(table.has_partitions)
            .bind(&schema_json)
            .bind(&table.owner)
            .bind(table.lifecycle)
            .bind(table.size)
            .bind(table.num_rows)
            .bind(table.last_ddl_time)
            .bind(table.id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn batch_update_partitions(
        conn: &mut SqliteConnection,
        partitions: &[Partition],
    ) -> Result<()> {
        for partition in partitions {
            sqlx::query(
                "UPDATE catalog_partition SET size = ?, num_rows = ?, last_ddl_time = ? WHERE id = ?",
            )
            .bind(partition.size)
            .bind(partition.num_rows)
            .bind(partition.last_ddl_time)
            .bind(partition.id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn batch_insert_databases(conn: &mut SqliteConnection, dbs: &[Database]) -> Result<()> {
        for chunk in dbs.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO db (source_id, name, owner, description, location, size, num_rows, last_ddl_time, status) ",
            );
            qb.push_values(chunk, |mut b, db| {
                b.push_bind(db.source_id)
                    .push_bind(&db.name)
                    .push_bind(&db.owner)
                    .push_bind(&db.description)
                    .push_bind(&db.location)
                    .push_bind(db.size)
                    .push_bind(db.num_rows)
                    .push_bind(db.last_ddl_time)
                    .push_bind(db.status.as_str());
            });
            qb.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// 批量插入新表，调用方插入后需要通过 `table_ids` 回填 id
    pub async fn batch_insert_tables(conn: &mut SqliteConnection, tables: &[Table]) -> Result<()> {
        let schemas = tables
            .iter()
            .map(|t| serde_json::to_string(&t.schema))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let rows: Vec<_> = tables.iter().zip(schemas.iter()).collect();

        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO catalog_table (source_id, db_id, db_name, schema_name, name, table_type, has_partitions, table_schema, owner, lifecycle, size, num_rows, last_ddl_time, status) ",
            );
            qb.push_values(chunk, |mut b, (table, schema_json)| {
                b.push_bind(table.source_id)
                    .push_bind(table.db_id)
                    .push_bind(&table.db_name)
                    .push_bind(&table.schema_name)
                    .push_bind(&table.name)
                    .push_bind(&table.table_type)
                    .push_bind(table.has_partitions)
                    .push_bind(schema_json.as_str())
                    .push_bind(&table.owner)
                    .push_bind(table.lifecycle)
                    .push_bind(table.size)
                    .push_bind(table.num_rows)
                    .push_bind(table.last_ddl_time)
                    .push_bind(table.status.as_str());
            });
            qb.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// 按 `batch_size` 分批插入新分区
    pub async fn batch_insert_partitions(
        conn: &mut SqliteConnection,
        partitions: &[Partition],
        batch_size: usize,
    ) -> Result<()> {
        const COLUMNS: usize = 11;
        let batch_size = batch_size.clamp(1, MAX_BIND_PARAMS / COLUMNS);

        for chunk in partitions.chunks(batch_size) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO catalog_partition (source_id, db_id, table_id, db_name, schema_name, table_name, value, size, num_rows, last_ddl_time, status) ",
            );
            qb.push_values(chunk, |mut b, p| {
                b.push_bind(p.source_id)
                    .push_bind(p.db_id)
                    .push_bind(p.table_id)
                    .push_bind(&p.db_name)
                    .push_bind(&p.schema_name)
                    .push_bind(&p.table_name)
                    .push_bind(&p.value)
                    .push_bind(p.size)
                    .push_bind(p.num_rows)
                    .push_bind(p.last_ddl_time)
                    .push_bind(p.status.as_str());
            });
            qb.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// 任务状态变化时同步分区的迁移状态
    pub async fn set_partition_status(
        conn: &mut SqliteConnection,
        partition_ids: &[i64],
        status: MigrationStatus,
    ) -> Result<()> {
        for chunk in partition_ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE catalog_partition SET status = ");
            qb.push_bind(status.as_str());
            qb.push(" WHERE id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            qb.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    pub async fn set_table_status(
        conn: &mut SqliteConnection,
        table_id: i64,
        status: MigrationStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE catalog_table SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(table_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DataSourceRow {
    id: i64,
    name: String,
    source_type: String,
    config: String,
    db_num: i64,
    table_num: i64,
    partition_num: i64,
    init_status: String,
    last_update_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DataSourceRow> for DataSource {
    type Error = AppError;

    fn try_from(row: DataSourceRow) -> Result<Self> {
        let source_type = SourceType::from_str(&row.source_type)
            .ok_or_else(|| AppError::Config(format!("Invalid source_type: {}", row.source_type)))?;
        let init_status = InitStatus::try_from(row.init_status).map_err(AppError::Config)?;
        let config: SourceConfig = crypto::decrypt_json(&row.config)?;

        Ok(DataSource {
            id: row.id,
            name: row.name,
            source_type,
            config,
            db_num: row.db_num,
            table_num: row.table_num,
            partition_num: row.partition_num,
            init_status,
            last_update_time: row.last_update_time,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DatabaseRow {
    id: i64,
    source_id: i64,
    name: String,
    owner: Option<String>,
    description: Option<String>,
    location: Option<String>,
    size: Option<i64>,
    num_rows: Option<i64>,
    last_ddl_time: Option<DateTime<Utc>>,
    status: String,
}

impl TryFrom<DatabaseRow> for Database {
    type Error = AppError;

    fn try_from(row: DatabaseRow) -> Result<Self> {
        Ok(Database {
            id: row.id,
            source_id: row.source_id,
            name: row.name,
            owner: row.owner,
            description: row.description,
            location: row.location,
            size: row.size,
            num_rows: row.num_rows,
            last_ddl_time: row.last_ddl_time,
            status: MigrationStatus::try_from(row.status).map_err(AppError::Config)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TableRow {
    id: i64,
    source_id: i64,
    db_id: i64,
    db_name: String,
    schema_name: String,
    name: String,
    table_type: Option<String>,
    has_partitions: bool,
    table_schema: String,
    owner: Option<String>,
    lifecycle: Option<i64>,
    size: Option<i64>,
    num_rows: Option<i64>,
    last_ddl_time: Option<DateTime<Utc>>,
    status: String,
}

impl TryFrom<TableRow> for Table {
    type Error = AppError;

    fn try_from(row: TableRow) -> Result<Self> {
        let schema: TableSchema = serde_json::from_str(&row.table_schema)?;

        Ok(Table {
            id: row.id,
            source_id: row.source_id,
            db_id: row.db_id,
            db_name: row.db_name,
            schema_name: row.schema_name,
            name: row.name,
            table_type: row.table_type,
            has_partitions: row.has_partitions,
            schema,
            owner: row.owner,
            lifecycle: row.lifecycle,
            size: row.size,
            num_rows: row.num_rows,
            last_ddl_time: row.last_ddl_time,
            status: MigrationStatus::try_from(row.status).map_err(AppError::Config)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PartitionRow {
    id: i64,
    source_id: i64,
    db_id: i64,
    table_id: i64,
    db_name: String,
    schema_name: String,
    table_name: String,
    value: String,
    size: Option<i64>,
    num_rows: Option<i64>,
    last_ddl_time: Option<DateTime<Utc>>,
    status: String,
}

impl TryFrom<PartitionRow> for Partition {
    type Error = AppError;

    fn try_from(row: PartitionRow) -> Result<Self> {
        Ok(Partition {
            id: row.id,
            source_id: row.source_id,
            db_id: row.db_id,
            table_id: row.table_id,
            db_name: row.db_name,
            schema_name: row.schema_name,
            table_name: row.table_name,
            value: row.value,
            size: row.size,
            num_rows: row.num_rows,
            last_ddl_time: row.last_ddl_time,
            status: MigrationStatus::try_from(row.status).map_err(AppError::Config)?,
        })
    }
}
