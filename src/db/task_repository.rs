use crate::models::{Job, JobConfig, JobType, Task, TaskStatus, TaskType};
use crate::utils::error::{AppError, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap};

use super::repository::ID_CHUNK;

const TASK_INSERT_CHUNK: usize = 500;
const TASK_PARTITION_INSERT_CHUNK: usize = 2000;

const TASK_COLUMNS: &str = "id, job_id, source_id, db_id, table_id, db_name, schema_name, table_name, dst_db_name, dst_table_name, task_type, status, running, restart, stopped, start_time, end_time, created_at";

/// 作业仓库
pub struct JobRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn max_id(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM job")
            .fetch_one(self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    pub async fn insert(conn: &mut SqliteConnection, job: &Job) -> Result<()> {
        let config = serde_json::to_string(&job.config)?;

        sqlx::query(
            r#"
            INSERT INTO job (id, description, source_id, source_name, db_name, dst_db_name, job_type, task_type, config, stopped, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(&job.description)
        .bind(job.source_id)
        .bind(&job.source_name)
        .bind(&job.db_name)
        .bind(&job.dst_db_name)
        .bind(job.job_type.as_str())
        .bind(job.task_type.as_str())
        .bind(&config)
        .bind(job.stopped)
        .bind(job.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, description, source_id, source_name, db_name, dst_db_name, job_type, task_type, config, stopped, created_at FROM job WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job with id {} not found", id)))?;

        row.try_into()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// 设置作业及其全部任务的 stopped 标记
    pub async fn set_stopped(conn: &mut SqliteConnection, id: i64, stopped: bool) -> Result<()> {
        sqlx::query("UPDATE job SET stopped = ? WHERE id = ?")
            .bind(stopped)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("UPDATE task SET stopped = ? WHERE job_id = ?")
            .bind(stopped)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

/// 任务仓库
pub struct TaskRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn max_id(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM task")
            .fetch_one(self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// 批量插入任务以及任务和分区的关联
    pub async fn batch_insert(conn: &mut SqliteConnection, tasks: &[Task]) -> Result<()> {
        for chunk in tasks.chunks(TASK_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO task ({}) ",
                TASK_COLUMNS
            ));
            qb.push_values(chunk, |mut b, task| {
                b.push_bind(task.id)
                    .push_bind(task.job_id)
                    .push_bind(task.source_id)
                    .push_bind(task.db_id)
                    .push_bind(task.table_id)
                    .push_bind(&task.db_name)
                    .push_bind(&task.schema_name)
                    .push_bind(&task.table_name)
                    .push_bind(&task.dst_db_name)
                    .push_bind(&task.dst_table_name)
                    .push_bind(task.task_type.as_str())
                    .push_bind(task.status.as_str())
                    .push_bind(task.running)
                    .push_bind(task.restart)
                    .push_bind(task.stopped)
                    .push_bind(task.start_time)
                    .push_bind(task.end_time)
                    .push_bind(task.created_at);
            });
            qb.build().execute(&mut *conn).await?;
        }

        let links: Vec<(i64, i64, i64)> = tasks
            .iter()
            .flat_map(|task| task.partitions.iter().map(|pid| (task.job_id, task.id, *pid)))
            .collect();

        for chunk in links.chunks(TASK_PARTITION_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO task_partition (job_id, task_id, partition_id) ");
            qb.push_values(chunk, |mut b, (job_id, task_id, partition_id)| {
                b.push_bind(*job_id)
                    .push_bind(*task_id)
                    .push_bind(*partition_id);
            });
            qb.build().execute(&mut *conn).await?;
        }

        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Task> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_id_in(&mut conn, id).await
    }

    pub async fn find_by_id_in(conn: &mut SqliteConnection, id: i64) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM task WHERE id = ?",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task with id {} not found", id)))?;

        let mut partitions = Self::partitions_of(conn, &[id]).await?;
        let mut task: Task = row.try_into()?;
        task.partitions = partitions.remove(&id).unwrap_or_default();
        Ok(task)
    }

    pub async fn list_by_job(&self, job_id: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM task WHERE job_id = ? ORDER BY id",
            TASK_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(self.pool)
        .await?;

        self.with_partitions(rows).await
    }

    /// 可以交给执行器的任务：作业和任务都未停止，且处于初始状态或被标记重跑
    pub async fn list_runnable(&self, limit: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {} FROM task
            WHERE stopped = 0 AND running = 0 AND (status = ? OR restart = 1)
              AND job_id IN (SELECT id FROM job WHERE stopped = 0)
            ORDER BY id
            LIMIT ?
            "#,
            TASK_COLUMNS
        ))
        .bind(TaskStatus::Init.as_str())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        self.with_partitions(rows).await
    }

    async fn with_partitions(&self, rows: Vec<TaskRow>) -> Result<Vec<Task>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut conn = self.pool.acquire().await?;
        let mut partitions = Self::partitions_of(&mut conn, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let mut task: Task = row.try_into()?;
                task.partitions = partitions.remove(&task.id).unwrap_or_default();
                Ok(task)
            })
            .collect()
    }

    /// 任务 id -> 分区 id 列表（保持插入顺序）
    async fn partitions_of(
        conn: &mut SqliteConnection,
        task_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<i64>>> {
        let mut result: HashMap<i64, Vec<i64>> = HashMap::new();
        for chunk in task_ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT task_id, partition_id FROM task_partition WHERE task_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY rowid");

            let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
            for (task_id, partition_id) in rows {
                result.entry(task_id).or_default().push(partition_id);
            }
        }
        Ok(result)
    }

    /// 查找引用了这些分区或整表的未结束任务，返回去重排序后的 `db.table`
    pub async fn find_conflicting_tables(
        conn: &mut SqliteConnection,
        partition_ids: &[i64],
        table_ids: &[i64],
    ) -> Result<Vec<String>> {
        let terminal = TaskStatus::terminal_values();
        let mut names = BTreeSet::new();

        for chunk in partition_ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT DISTINCT t.db_name, t.table_name FROM task t JOIN task_partition tp ON tp.task_id = t.id WHERE tp.partition_id IN (",
            );
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            push_non_terminal(&mut qb, "t.", &terminal);

            let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&mut *conn).await?;
            names.extend(rows.into_iter().map(|(db, table)| format!("{}.{}", db, table)));
        }

        for chunk in table_ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT DISTINCT db_name, table_name FROM task WHERE table_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            push_non_terminal(&mut qb, "", &terminal);

            let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&mut *conn).await?;
            names.extend(rows.into_iter().map(|(db, table)| format!("{}.{}", db, table)));
        }

        Ok(names.into_iter().collect())
    }

    pub async fn set_running(
        conn: &mut SqliteConnection,
        id: i64,
        running: bool,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE task SET running = ?, restart = CASE WHEN ? THEN 0 ELSE restart END, start_time = COALESCE(?, start_time) WHERE id = ?",
        )
        .bind(running)
        .bind(running)
        .bind(start_time)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 停止单个任务，同时释放 running
    pub async fn set_stopped(conn: &mut SqliteConnection, id: i64, stopped: bool) -> Result<()> {
        sqlx::query(
            "UPDATE task SET stopped = ?, running = CASE WHEN ? THEN 0 ELSE running END WHERE id = ?",
        )
        .bind(stopped)
        .bind(stopped)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn set_restart(conn: &mut SqliteConnection, id: i64, restart: bool) -> Result<()> {
        sqlx::query("UPDATE task SET restart = ? WHERE id = ?")
            .bind(restart)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// 把作业下失败的任务标记为重跑
    pub async fn restart_failed_of_job(conn: &mut SqliteConnection, job_id: i64) -> Result<u64> {
        let failed: Vec<&str> = TaskStatus::ALL
            .iter()
            .filter(|s| s.is_failed())
            .map(|s| s.as_str())
            .collect();

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE task SET restart = 1 WHERE job_id = ");
        qb.push_bind(job_id);
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in failed {
            separated.push_bind(status);
        }
        separated.push_unseparated(")");

        let result = qb.build().execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: i64,
        status: TaskStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE task SET status = ?, end_time = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(end_time)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// 恢复到初始状态，清掉执行进度
    pub async fn reset(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE task SET status = ?, running = 0, restart = 0, start_time = NULL, end_time = NULL WHERE id = ?",
        )
        .bind(TaskStatus::Init.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// 未结束：状态不在终态里，或者已被标记重跑
fn push_non_terminal(qb: &mut QueryBuilder<'_, Sqlite>, alias: &str, terminal: &[&'static str]) {
    qb.push(format!(" AND ({}status NOT IN (", alias));
    let mut separated = qb.separated(", ");
    for status in terminal {
        separated.push_bind(*status);
    }
    separated.push_unseparated(format!(") OR {}restart = 1)", alias));
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    description: Option<String>,
    source_id: i64,
    source_name: String,
    db_name: String,
    dst_db_name: String,
    job_type: String,
    task_type: String,
    config: String,
    stopped: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self> {
        let config: JobConfig = serde_json::from_str(&row.config)?;

        Ok(Job {
            id: row.id,
            description: row.description,
            source_id: row.source_id,
            source_name: row.source_name,
            db_name: row.db_name,
            dst_db_name: row.dst_db_name,
            job_type: JobType::try_from(row.job_type).map_err(AppError::Config)?,
            task_type: TaskType::try_from(row.task_type).map_err(AppError::Config)?,
            config,
            stopped: row.stopped,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    job_id: i64,
    source_id: i64,
    db_id: i64,
    table_id: i64,
    db_name: String,
    schema_name: String,
    table_name: String,
    dst_db_name: String,
    dst_table_name: String,
    task_type: String,
    status: String,
    running: bool,
    restart: bool,
    stopped: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            job_id: row.job_id,
            source_id: row.source_id,
            db_id: row.db_id,
            table_id: row.table_id,
            db_name: row.db_name,
            schema_name: row.schema_name,
            table_name: row.table_name,
            dst_db_name: row.dst_db_name,
            dst_table_name: row.dst_table_name,
            task_type: TaskType::try_from(row.task_type).map_err(AppError::Config)?,
            status: TaskStatus::try_from(row.status).map_err(AppError::Config)?,
            running: row.running,
            restart: row.restart,
            stopped: row.stopped,
            partitions: Vec::new(),
            start_time: row.start_time,
            end_time: row.end_time,
            created_at: row.created_at,
        })
    }
}
