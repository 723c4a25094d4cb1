use crate::db::{CatalogRepository, DataSourceRepository, JobRepository, TaskRepository};
use crate::models::{
    partition_spec, Database, DataSource, Job, JobConfig, JobRequest, JobType, MigrationStatus,
    Partition, Table, Task, TaskStatus, TaskType,
};
use crate::services::id_allocator::IdAllocator;
use crate::settings::Settings;
use crate::utils::error::{AppError, Result};
use crate::utils::{KeyLock, NameFilter, PartitionColumnValue, PartitionFilter, PartitionGrouping};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

/// 一张表的任务计划：每个分组一个任务，空分组表示整表任务
#[derive(Debug)]
struct TablePlan {
    table: Table,
    groups: Vec<Vec<i64>>,
}

impl TablePlan {
    fn whole_table(table: Table) -> Self {
        Self {
            table,
            groups: vec![Vec::new()],
        }
    }
}

/// 作业提交：解析范围、生成任务、冲突检查、一次事务落库
pub struct JobSubmitter<'a> {
    pool: &'a SqlitePool,
    settings: &'a Settings,
    ids: &'a IdAllocator,
    locks: &'a KeyLock,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        settings: &'a Settings,
        ids: &'a IdAllocator,
        locks: &'a KeyLock,
    ) -> Self {
        Self {
            pool,
            settings,
            ids,
            locks,
        }
    }

    /// 提交作业，返回作业 id
    pub async fn submit(&self, req: JobRequest) -> Result<i64> {
        let source = DataSourceRepository::new(self.pool)
            .find_by_name(&req.source_name)
            .await?;
        let task_type = resolve_task_type(&req.config, &source)?;
        validate_config(&req.config)?;

        let db = CatalogRepository::new(self.pool)
            .find_database(source.id, &req.db_name)
            .await?;

        let group_size = req
            .config
            .partition_group_size
            .or(source.config.partition_group_size)
            .unwrap_or(self.settings.job.partition_group_size);
        let grouping = PartitionGrouping::new(group_size, req.config.max_partition_size_gb);

        // 冲突检查到提交之间持有同一把锁
        let _guard = self.locks.lock(&format!("{}.{}", source.name, db.name)).await;

        let plans = match req.job_type {
            JobType::Database => {
                let tables = self.resolve_database_tables(&db, &req.config).await?;
                self.plan_tables(tables, &req.config, &grouping).await?
            }
            JobType::Tables => {
                let tables = self.resolve_named_tables(&db, &req.config.tables).await?;
                self.plan_tables(tables, &req.config, &grouping).await?
            }
            JobType::Partitions => {
                self.plan_partitions(&source, &db, &req.config.partitions, &grouping)
                    .await?
            }
        };

        self.check_conflicts(&plans).await?;

        let now = Utc::now();
        let job = Job {
            id: self.ids.next_job_id(),
            description: req.description,
            source_id: source.id,
            source_name: source.name.clone(),
            db_name: db.name.clone(),
            dst_db_name: req.dst_db_name.unwrap_or_else(|| db.name.clone()),
            job_type: req.job_type,
            task_type,
            config: req.config,
            stopped: false,
            created_at: now,
        };
        let tasks = build_tasks(&job, plans, self.ids);

        tracing::info!(
            "Submitting job {} on {}.{} ({}) with {} tasks",
            job.id,
            job.source_name,
            job.db_name,
            job.job_type.as_str(),
            tasks.len()
        );

        let mut tx = self.pool.begin().await?;
        JobRepository::insert(&mut tx, &job).await?;
        TaskRepository::batch_insert(&mut tx, &tasks).await?;
        tx.commit().await?;

        Ok(job.id)
    }

    async fn resolve_database_tables(&self, db: &Database, config: &JobConfig) -> Result<Vec<Table>> {
        let filter = NameFilter::new(&config.table_whitelist, &config.table_blacklist);
        let tables: Vec<Table> = CatalogRepository::new(self.pool)
            .list_tables_by_db(db.id)
            .await?
            .into_iter()
            .filter(|t| filter.accepts_table(&db.name, &t.name))
            .collect();

        if tables.is_empty() {
            return Err(AppError::NoTablesFound(db.name.clone()));
        }
        Ok(tables)
    }

    async fn resolve_named_tables(&self, db: &Database, names: &[String]) -> Result<Vec<Table>> {
        if names.is_empty() {
            return Err(AppError::InvalidInput("tables must not be empty".to_string()));
        }

        let mut by_name: HashMap<String, Table> = CatalogRepository::new(self.pool)
            .list_tables_by_db(db.id)
            .await?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let mut tables = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match by_name.remove(name) {
                Some(table) => tables.push(table),
                None if tables.iter().any(|t: &Table| &t.name == name) => {}
                None => missing.push(name.as_str()),
            }
        }

        if !missing.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Tables not found in {}: {}",
                db.name,
                missing.join(", ")
            )));
        }
        Ok(tables)
    }

    /// 表范围：过滤 -> 增量 -> 分组
    async fn plan_tables(
        &self,
        tables: Vec<Table>,
        config: &JobConfig,
        grouping: &PartitionGrouping,
    ) -> Result<Vec<TablePlan>> {
        let catalog = CatalogRepository::new(self.pool);
        let mut plans = Vec::with_capacity(tables.len());

        for table in tables {
            if !table.has_partitions {
                plans.push(TablePlan::whole_table(table));
                continue;
            }

            let mut partitions = catalog.list_partitions_by_table(table.id).await?;
            if let Some(expr) = config.partition_filters.get(&table.name) {
                partitions = apply_partition_filter(&table, expr, partitions)?;
            }
            if config.increment {
                partitions.retain(|p| p.status != MigrationStatus::Done);
            }

            if partitions.is_empty() {
                tracing::debug!("No partitions left for {}, schema only", table.full_name());
                plans.push(TablePlan::whole_table(table));
                continue;
            }

            let groups = grouping
                .group(partitions, |p| p.size)
                .into_iter()
                .map(|group| group.into_iter().map(|p| p.id).collect())
                .collect();
            plans.push(TablePlan { table, groups });
        }

        Ok(plans)
    }

    /// 分区范围：按所属表分桶后各自分组，不做增量过滤
    async fn plan_partitions(
        &self,
        source: &DataSource,
        db: &Database,
        partition_ids: &[i64],
        grouping: &PartitionGrouping,
    ) -> Result<Vec<TablePlan>> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = partition_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Err(AppError::InvalidInput("partitions must not be empty".to_string()));
        }

        let catalog = CatalogRepository::new(self.pool);
        let partitions = catalog.find_partitions_by_ids(&ids).await?;
        if partitions.len() != ids.len() {
            let found: HashSet<i64> = partitions.iter().map(|p| p.id).collect();
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(AppError::InvalidInput(format!(
                "Partitions not found: {}",
                missing.join(", ")
            )));
        }

        if let Some(p) = partitions
            .iter()
            .find(|p| p.source_id != source.id || p.db_id != db.id)
        {
            return Err(AppError::InvalidInput(format!(
                "Partition {} does not belong to {}.{}",
                p.id, source.name, db.name
            )));
        }

        let mut table_order: Vec<i64> = Vec::new();
        let mut by_table: HashMap<i64, Vec<Partition>> = HashMap::new();
        for partition in partitions {
            if !by_table.contains_key(&partition.table_id) {
                table_order.push(partition.table_id);
            }
            by_table.entry(partition.table_id).or_default().push(partition);
        }

        let mut tables: HashMap<i64, Table> = catalog
            .find_tables_by_ids(&table_order)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut plans = Vec::with_capacity(table_order.len());
        for table_id in table_order {
            let table = tables.remove(&table_id).ok_or_else(|| {
                AppError::NotFound(format!("Table with id {} not found", table_id))
            })?;
            let partitions = by_table.remove(&table_id).unwrap_or_default();
            let groups = grouping
                .group(partitions, |p| p.size)
                .into_iter()
                .map(|group| group.into_iter().map(|p| p.id).collect())
                .collect();
            plans.push(TablePlan { table, groups });
        }

        Ok(plans)
    }

    /// 分区任务按分区 id 查冲突，整表任务按表 id 查冲突
    async fn check_conflicts(&self, plans: &[TablePlan]) -> Result<()> {
        let mut partition_ids = Vec::new();
        let mut table_ids = Vec::new();
        for plan in plans {
            for group in &plan.groups {
                if group.is_empty() {
                    table_ids.push(plan.table.id);
                } else {
                    partition_ids.extend_from_slice(group);
                }
            }
        }

        let mut conn = self.pool.acquire().await?;
        let conflicts =
            TaskRepository::find_conflicting_tables(&mut conn, &partition_ids, &table_ids).await?;
        drop(conn);

        if !conflicts.is_empty() {
            tracing::warn!("Job submission rejected, conflicting tables: {:?}", conflicts);
            return Err(AppError::TaskConflict(conflicts));
        }
        Ok(())
    }
}

fn resolve_task_type(config: &JobConfig, source: &DataSource) -> Result<TaskType> {
    let task_type = config
        .task_type
        .unwrap_or_else(|| TaskType::default_for(source.source_type));

    if task_type.source_type() != source.source_type {
        return Err(AppError::job_config(
            "task_type",
            format!(
                "task type {} does not match data source type {}",
                task_type.as_str(),
                source.source_type.as_str()
            ),
        ));
    }
    Ok(task_type)
}

fn validate_config(config: &JobConfig) -> Result<()> {
    if !config.table_whitelist.is_empty() && !config.table_blacklist.is_empty() {
        return Err(AppError::job_config(
            "table_whitelist",
            "table_whitelist and table_blacklist cannot be set at the same time",
        ));
    }
    if config.partition_group_size == Some(0) {
        return Err(AppError::job_config(
            "partition_group_size",
            "partition_group_size must be greater than 0",
        ));
    }
    Ok(())
}

/// 只保留命中过滤表达式的分区
fn apply_partition_filter(
    table: &Table,
    expr: &str,
    partitions: Vec<Partition>,
) -> Result<Vec<Partition>> {
    let filter = PartitionFilter::parse(expr)
        .map_err(|e| AppError::job_config("partition_filter", format!("{}: {}", expr, e)))?;

    let mut kept = Vec::new();
    for partition in partitions {
        let columns: Vec<PartitionColumnValue<'_>> = partition_spec(&partition.value)
            .into_iter()
            .map(|(name, value)| PartitionColumnValue {
                name,
                data_type: table.schema.partition_column_type(name).unwrap_or("string"),
                value,
            })
            .collect();

        let result = filter.evaluate(&columns);
        if let Some(err) = result.type_error {
            return Err(AppError::job_config("partition_filter", err));
        }
        if result.matched {
            kept.push(partition);
        }
    }

    if kept.is_empty() {
        return Err(AppError::job_config(
            "partition_filter",
            format!(
                "partition filter {} matched no partitions of {}",
                filter.expr(),
                table.full_name()
            ),
        ));
    }

    tracing::debug!(
        "Partition filter `{}` kept {} partitions of {}",
        filter.expr(),
        kept.len(),
        table.full_name()
    );
    Ok(kept)
}

/// 轮流从每张表取一个任务，相邻任务尽量不落在同一张目标表上
fn interleave<T>(lists: Vec<Vec<T>>) -> Vec<T> {
    let total = lists.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(total);

    while out.len() < total {
        for iter in iters.iter_mut() {
            if let Some(item) = iter.next() {
                out.push(item);
            }
        }
    }
    out
}

fn build_tasks(job: &Job, plans: Vec<TablePlan>, ids: &IdAllocator) -> Vec<Task> {
    let per_table: Vec<Vec<(usize, Vec<i64>)>> = plans
        .iter()
        .enumerate()
        .map(|(idx, plan)| plan.groups.iter().map(|g| (idx, g.clone())).collect())
        .collect();
    let ordered = interleave(per_table);
    let task_ids = ids.next_task_ids(ordered.len());

    ordered
        .into_iter()
        .zip(task_ids)
        .map(|((idx, partitions), id)| {
            let table = &plans[idx].table;
            Task {
                id,
                job_id: job.id,
                source_id: job.source_id,
                db_id: table.db_id,
                table_id: table.id,
                db_name: table.db_name.clone(),
                schema_name: table.schema_name.clone(),
                table_name: table.name.clone(),
                dst_db_name: job.dst_db_name.clone(),
                dst_table_name: job
                    .config
                    .table_mapping
                    .get(&table.name)
                    .cloned()
                    .unwrap_or_else(|| table.name.clone()),
                task_type: job.task_type,
                status: TaskStatus::Init,
                running: false,
                restart: false,
                stopped: false,
                partitions,
                start_time: None,
                end_time: None,
                created_at: job.created_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::TaskLifecycle;
    use crate::test_support::TestEnv;

    fn request(job_type: JobType, config: JobConfig) -> JobRequest {
        JobRequest {
            description: None,
            source_name: "hive1".to_string(),
            db_name: "d".to_string(),
            dst_db_name: None,
            job_type,
            config,
        }
    }

    async fn submit(env: &TestEnv, req: JobRequest) -> Result<i64> {
        JobSubmitter::new(&env.pool, &env.settings, &env.ids, &env.locks)
            .submit(req)
            .await
    }

    async fn partition_ids(env: &TestEnv, table: &str) -> Vec<i64> {
        let repo = CatalogRepository::new(&env.pool);
        let tables = repo.list_tables(env.source.id).await.unwrap();
        let table = tables.iter().find(|t| t.name == table).unwrap();
        repo.list_partitions_by_table(table.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    async fn row_counts(env: &TestEnv) -> (i64, i64) {
        (
            JobRepository::new(&env.pool).count().await.unwrap(),
            TaskRepository::new(&env.pool).count().await.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_database_job_with_whitelist_one_task_per_partition() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            table_whitelist: vec!["t1".to_string()],
            partition_group_size: Some(1),
            ..Default::default()
        };

        let job_id = submit(&env, request(JobType::Database, config)).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.table_name == "t1" && t.partitions.len() == 1));
        let mut covered: Vec<i64> = tasks.iter().flat_map(|t| t.partitions.clone()).collect();
        covered.sort();
        assert_eq!(covered, partition_ids(&env, "t1").await);

        let job = JobRepository::new(&env.pool).find_by_id(job_id).await.unwrap();
        assert_eq!(job.task_type, TaskType::HiveToMc);
        assert_eq!(job.dst_db_name, "d");
    }

    #[tokio::test]
    async fn test_database_job_unpartitioned_table_gets_schema_task() {
        let env = TestEnv::refreshed().await;
        let job_id = submit(&env, request(JobType::Database, JobConfig::default()))
            .await
            .unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();

        assert_eq!(tasks.len(), 2);
        let t2 = tasks.iter().find(|t| t.table_name == "t2").unwrap();
        assert!(t2.partitions.is_empty());
        let t1 = tasks.iter().find(|t| t.table_name == "t1").unwrap();
        assert_eq!(t1.partitions.len(), 2);
    }

    #[tokio::test]
    async fn test_database_job_without_tables_fails() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            table_whitelist: vec!["missing".to_string()],
            ..Default::default()
        };
        let err = submit(&env, request(JobType::Database, config)).await.unwrap_err();
        assert!(matches!(err, AppError::NoTablesFound(ref db) if db == "d"));
        assert_eq!(row_counts(&env).await, (0, 0));
    }

    #[tokio::test]
    async fn test_partitions_job_conflicts_with_running_task() {
        let env = TestEnv::refreshed().await;
        let day1 = partition_ids(&env, "t1").await[0];
        let config = JobConfig {
            partitions: vec![day1],
            ..Default::default()
        };

        let first = submit(&env, request(JobType::Partitions, config.clone()))
            .await
            .unwrap();
        let task = &TaskRepository::new(&env.pool).list_by_job(first).await.unwrap()[0];
        let mut conn = env.pool.acquire().await.unwrap();
        TaskRepository::set_status(&mut conn, task.id, TaskStatus::DataDoing, None)
            .await
            .unwrap();
        drop(conn);
        let before = row_counts(&env).await;

        let err = submit(&env, request(JobType::Partitions, config)).await.unwrap_err();
        match err {
            AppError::TaskConflict(tables) => assert_eq!(tables, vec!["d.t1".to_string()]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(row_counts(&env).await, before);
    }

    #[tokio::test]
    async fn test_finished_tasks_do_not_conflict() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            tables: vec!["t2".to_string()],
            ..Default::default()
        };
        let first = submit(&env, request(JobType::Tables, config.clone())).await.unwrap();
        let task = &TaskRepository::new(&env.pool).list_by_job(first).await.unwrap()[0];

        assert!(matches!(
            submit(&env, request(JobType::Tables, config.clone())).await,
            Err(AppError::TaskConflict(_))
        ));

        let mut conn = env.pool.acquire().await.unwrap();
        TaskRepository::set_status(&mut conn, task.id, TaskStatus::Done, Some(Utc::now()))
            .await
            .unwrap();
        drop(conn);
        assert!(submit(&env, request(JobType::Tables, config)).await.is_ok());
    }

    #[tokio::test]
    async fn test_retried_failed_tasks_still_conflict() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            increment: false,
            ..Default::default()
        };
        let first = submit(&env, request(JobType::Database, config.clone())).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(first).await.unwrap();
        assert_eq!(tasks.len(), 2);

        let mut conn = env.pool.acquire().await.unwrap();
        for task in &tasks {
            TaskRepository::set_status(&mut conn, task.id, TaskStatus::DataFailed, Some(Utc::now()))
                .await
                .unwrap();
        }
        drop(conn);

        let lifecycle = TaskLifecycle::new(&env.pool);
        assert_eq!(lifecycle.retry_job(first).await.unwrap(), 2);
        let runnable = TaskRepository::new(&env.pool).list_runnable(10).await.unwrap();
        assert_eq!(runnable.len(), 2);

        match submit(&env, request(JobType::Database, config)).await {
            Err(AppError::TaskConflict(tables)) => {
                assert!(tables.contains(&"d.t1".to_string()), "{:?}", tables);
                assert!(tables.contains(&"d.t2".to_string()), "{:?}", tables);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(row_counts(&env).await, (1, 2));
    }

    #[tokio::test]
    async fn test_filter_matching_nothing_is_config_error() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            tables: vec!["t1".to_string()],
            partition_filters: HashMap::from([("t1".to_string(), "day >= 3".to_string())]),
            ..Default::default()
        };

        let err = submit(&env, request(JobType::Tables, config)).await.unwrap_err();
        match err {
            AppError::JobConfig { field, message } => {
                assert_eq!(field, "partition_filter");
                assert_eq!(message, "partition filter day >= 3 matched no partitions of d.t1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(row_counts(&env).await, (0, 0));
    }

    #[tokio::test]
    async fn test_filter_keeps_matching_partitions() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            tables: vec!["t1".to_string()],
            partition_filters: HashMap::from([("t1".to_string(), "day > 1".to_string())]),
            ..Default::default()
        };

        let job_id = submit(&env, request(JobType::Tables, config)).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].partitions, vec![partition_ids(&env, "t1").await[1]]);
    }

    #[tokio::test]
    async fn test_filter_errors() {
        let env = TestEnv::new().await;
        env.crawler.add_table("d", "t3", &["day"], &["day=2024-01-01"]);
        env.refresh().await.unwrap();

        let with_filter = |expr: &str| JobConfig {
            tables: vec!["t3".to_string()],
            partition_filters: HashMap::from([("t3".to_string(), expr.to_string())]),
            ..Default::default()
        };

        let err = submit(&env, request(JobType::Tables, with_filter("day > 3")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::JobConfig { ref message, .. } if message.contains("is not int value")));

        let err = submit(&env, request(JobType::Tables, with_filter("day >")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::JobConfig { ref field, .. } if field == "partition_filter"));
    }

    #[tokio::test]
    async fn test_increment_skips_done_partitions() {
        let env = TestEnv::refreshed().await;
        let ids = partition_ids(&env, "t1").await;
        let mut conn = env.pool.acquire().await.unwrap();
        CatalogRepository::set_partition_status(&mut conn, &ids[..1], MigrationStatus::Done)
            .await
            .unwrap();
        drop(conn);

        let tables = |increment| JobConfig {
            tables: vec!["t1".to_string()],
            increment,
            ..Default::default()
        };

        let job_id = submit(&env, request(JobType::Tables, tables(true))).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].partitions, vec![ids[1]]);

        let mut conn = env.pool.acquire().await.unwrap();
        TaskRepository::set_status(&mut conn, tasks[0].id, TaskStatus::Done, None)
            .await
            .unwrap();
        drop(conn);

        let job_id = submit(&env, request(JobType::Tables, tables(false))).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        assert_eq!(tasks[0].partitions, ids);
    }

    #[tokio::test]
    async fn test_group_size_splits_in_order() {
        let env = TestEnv::new().await;
        let values: Vec<String> = (0..120).map(|i| format!("day={}", i)).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        env.crawler.add_table("d", "big", &["day"], &refs);
        env.refresh().await.unwrap();

        let config = JobConfig {
            tables: vec!["big".to_string()],
            partition_group_size: Some(50),
            ..Default::default()
        };
        let job_id = submit(&env, request(JobType::Tables, config)).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();

        let sizes: Vec<usize> = tasks.iter().map(|t| t.partitions.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        let all: Vec<i64> = tasks.iter().flat_map(|t| t.partitions.clone()).collect();
        assert_eq!(all, partition_ids(&env, "big").await);
    }

    #[tokio::test]
    async fn test_size_cap_closes_groups() {
        let env = TestEnv::new().await;
        env.crawler.set_partition_size("d", "t1", "day=1", 1 << 30);
        env.crawler.set_partition_size("d", "t1", "day=2", 1 << 30);
        env.refresh().await.unwrap();

        let config = JobConfig {
            tables: vec!["t1".to_string()],
            max_partition_size_gb: Some(1.0),
            ..Default::default()
        };
        let job_id = submit(&env, request(JobType::Tables, config)).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_partitions_job_groups_by_table_and_interleaves() {
        let env = TestEnv::new().await;
        env.crawler.add_table("d", "t3", &["day"], &["day=1", "day=2", "day=3"]);
        env.refresh().await.unwrap();

        let mut ids = partition_ids(&env, "t3").await;
        ids.extend(partition_ids(&env, "t1").await);
        ids.push(ids[0]);
        let config = JobConfig {
            partitions: ids,
            partition_group_size: Some(1),
            ..Default::default()
        };

        let job_id = submit(&env, request(JobType::Partitions, config)).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        let order: Vec<&str> = tasks.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(order, vec!["t3", "t1", "t3", "t1", "t3"]);
    }

    #[tokio::test]
    async fn test_unknown_partition_rejected() {
        let env = TestEnv::refreshed().await;
        let config = JobConfig {
            partitions: vec![9999],
            ..Default::default()
        };
        let err = submit(&env, request(JobType::Partitions, config)).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_config_errors() {
        let env = TestEnv::refreshed().await;

        let config = JobConfig {
            task_type: Some(TaskType::McToMc),
            ..Default::default()
        };
        let err = submit(&env, request(JobType::Database, config)).await.unwrap_err();
        assert!(matches!(err, AppError::JobConfig { ref field, .. } if field == "task_type"));

        let config = JobConfig {
            table_whitelist: vec!["t1".to_string()],
            table_blacklist: vec!["t2".to_string()],
            ..Default::default()
        };
        let err = submit(&env, request(JobType::Database, config)).await.unwrap_err();
        assert!(matches!(err, AppError::JobConfig { ref field, .. } if field == "table_whitelist"));

        let config = JobConfig {
            tables: vec!["t1".to_string(), "nope".to_string()],
            ..Default::default()
        };
        let err = submit(&env, request(JobType::Tables, config)).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(row_counts(&env).await, (0, 0));
    }

    #[tokio::test]
    async fn test_destination_names() {
        let env = TestEnv::refreshed().await;
        let mut req = request(
            JobType::Tables,
            JobConfig {
                tables: vec!["t1".to_string(), "t2".to_string()],
                table_mapping: HashMap::from([("t2".to_string(), "t2_copy".to_string())]),
                ..Default::default()
            },
        );
        req.dst_db_name = Some("ods".to_string());

        let job_id = submit(&env, req).await.unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        let t1 = tasks.iter().find(|t| t.table_name == "t1").unwrap();
        let t2 = tasks.iter().find(|t| t.table_name == "t2").unwrap();
        assert_eq!((t1.dst_db_name.as_str(), t1.dst_table_name.as_str()), ("ods", "t1"));
        assert_eq!(t2.dst_table_name, "t2_copy");
    }

    #[test]
    fn test_interleave_round_robin() {
        let lists = vec![vec![1, 2, 3], vec![10], vec![20, 21]];
        assert_eq!(interleave(lists), vec![1, 10, 20, 2, 21, 3]);
        assert!(interleave::<i32>(vec![]).is_empty());
    }
}
