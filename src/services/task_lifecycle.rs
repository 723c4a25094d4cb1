use crate::db::{CatalogRepository, JobRepository, TaskRepository};
use crate::models::{Job, MigrationStatus, Task, TaskStatus};
use crate::utils::error::{AppError, Result};
use chrono::Utc;
use sqlx::SqlitePool;

/// 任务状态流转
///
/// 管理动作（停止、重试、重跑、重置）由 API 调用，`pick_up`/`set_status` 给执行器用。
pub struct TaskLifecycle<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskLifecycle<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn job(&self, job_id: i64) -> Result<Job> {
        JobRepository::new(self.pool).find_by_id(job_id).await
    }

    pub async fn tasks_of_job(&self, job_id: i64) -> Result<Vec<Task>> {
        JobRepository::new(self.pool).find_by_id(job_id).await?;
        TaskRepository::new(self.pool).list_by_job(job_id).await
    }

    pub async fn task(&self, task_id: i64) -> Result<Task> {
        TaskRepository::new(self.pool).find_by_id(task_id).await
    }

    /// 停止作业：它的任务不再被调度，已有状态不变
    pub async fn stop_job(&self, job_id: i64) -> Result<()> {
        JobRepository::new(self.pool).find_by_id(job_id).await?;

        let mut tx = self.pool.begin().await?;
        JobRepository::set_stopped(&mut tx, job_id, true).await?;
        tx.commit().await?;

        tracing::info!("Job {} stopped", job_id);
        Ok(())
    }

    /// 重试作业：取消停止，失败的任务全部标记重跑
    pub async fn retry_job(&self, job_id: i64) -> Result<u64> {
        JobRepository::new(self.pool).find_by_id(job_id).await?;

        let mut tx = self.pool.begin().await?;
        JobRepository::set_stopped(&mut tx, job_id, false).await?;
        let restarted = TaskRepository::restart_failed_of_job(&mut tx, job_id).await?;
        tx.commit().await?;

        tracing::info!("Job {} retried, {} failed tasks will restart", job_id, restarted);
        Ok(restarted)
    }

    /// 停止单个任务，清掉 running，不改状态
    pub async fn stop_task(&self, task_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        TaskRepository::find_by_id_in(&mut conn, task_id).await?;
        TaskRepository::set_stopped(&mut conn, task_id, true).await?;

        tracing::info!("Task {} stopped", task_id);
        Ok(())
    }

    /// 标记重跑，执行器下次会重新进入这个任务
    pub async fn restart_task(&self, task_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepository::find_by_id_in(&mut tx, task_id).await?;
        if task.status == TaskStatus::Init && !task.running {
            return Err(AppError::InvalidInput(format!(
                "Task {} has not started yet",
                task_id
            )));
        }
        TaskRepository::set_stopped(&mut tx, task_id, false).await?;
        TaskRepository::set_restart(&mut tx, task_id, true).await?;
        tx.commit().await?;

        tracing::info!("Task {} marked for restart", task_id);
        Ok(())
    }

    /// 回到 INIT，清掉执行进度，分区（或整表）的迁移状态也回到 INIT
    pub async fn reset_task(&self, task_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepository::find_by_id_in(&mut tx, task_id).await?;
        TaskRepository::reset(&mut tx, task_id).await?;
        mirror_status(&mut tx, &task, MigrationStatus::Init).await?;
        tx.commit().await?;

        tracing::info!("Task {} reset", task_id);
        Ok(())
    }

    /// 执行器领取任务：置 running，清 restart
    pub async fn pick_up(&self, task_id: i64) -> Result<Task> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepository::find_by_id_in(&mut tx, task_id).await?;
        if task.running {
            return Err(AppError::InvalidInput(format!(
                "Task {} is already running",
                task_id
            )));
        }
        if task.stopped {
            return Err(AppError::InvalidInput(format!("Task {} is stopped", task_id)));
        }

        TaskRepository::set_running(&mut tx, task_id, true, Some(Utc::now())).await?;
        let task = TaskRepository::find_by_id_in(&mut tx, task_id).await?;
        tx.commit().await?;

        tracing::debug!("Task {} picked up", task_id);
        Ok(task)
    }

    /// 写任务状态，并在同一事务里同步分区（整表任务则是表）的迁移状态
    pub async fn set_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepository::find_by_id_in(&mut tx, task_id).await?;

        let end_time = status.is_terminal().then(Utc::now);
        TaskRepository::set_status(&mut tx, task_id, status, end_time).await?;
        if status.is_terminal() {
            TaskRepository::set_running(&mut tx, task_id, false, None).await?;
        }
        mirror_status(&mut tx, &task, status.partition_status()).await?;
        tx.commit().await?;

        if status.is_failed() {
            tracing::warn!("Task {} ({}) failed with {}", task_id, task.full_table_name(), status.as_str());
        } else {
            tracing::debug!("Task {} -> {}", task_id, status.as_str());
        }
        Ok(())
    }

    pub async fn list_runnable(&self, limit: i64) -> Result<Vec<Task>> {
        TaskRepository::new(self.pool).list_runnable(limit).await
    }
}

async fn mirror_status(
    conn: &mut sqlx::SqliteConnection,
    task: &Task,
    status: MigrationStatus,
) -> Result<()> {
    if task.partitions.is_empty() {
        CatalogRepository::set_table_status(conn, task.table_id, status).await
    } else {
        CatalogRepository::set_partition_status(conn, &task.partitions, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobConfig, JobRequest, JobType};
    use crate::services::job_submitter::JobSubmitter;
    use crate::test_support::TestEnv;

    /// 整库作业：t1 一个分区任务（两个分区），t2 一个整表任务
    async fn submitted(env: &TestEnv) -> (i64, Vec<Task>) {
        let req = JobRequest {
            description: Some("lifecycle".to_string()),
            source_name: "hive1".to_string(),
            db_name: "d".to_string(),
            dst_db_name: None,
            job_type: JobType::Database,
            config: JobConfig::default(),
        };
        let job_id = JobSubmitter::new(&env.pool, &env.settings, &env.ids, &env.locks)
            .submit(req)
            .await
            .unwrap();
        let tasks = TaskRepository::new(&env.pool).list_by_job(job_id).await.unwrap();
        (job_id, tasks)
    }

    async fn partition_statuses(env: &TestEnv, task: &Task) -> Vec<MigrationStatus> {
        CatalogRepository::new(&env.pool)
            .find_partitions_by_ids(&task.partitions)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.status)
            .collect()
    }

    async fn table_status(env: &TestEnv, table_id: i64) -> MigrationStatus {
        CatalogRepository::new(&env.pool)
            .find_tables_by_ids(&[table_id])
            .await
            .unwrap()[0]
            .status
    }

    #[tokio::test]
    async fn test_status_mirrors_onto_partitions_and_table() {
        let env = TestEnv::refreshed().await;
        let (_, tasks) = submitted(&env).await;
        let lifecycle = TaskLifecycle::new(&env.pool);
        let partitioned = tasks.iter().find(|t| !t.partitions.is_empty()).unwrap();
        let whole = tasks.iter().find(|t| t.partitions.is_empty()).unwrap();

        lifecycle.pick_up(partitioned.id).await.unwrap();
        lifecycle.set_status(partitioned.id, TaskStatus::DataDoing).await.unwrap();
        assert_eq!(
            partition_statuses(&env, partitioned).await,
            vec![MigrationStatus::Doing, MigrationStatus::Doing]
        );

        lifecycle.set_status(partitioned.id, TaskStatus::Done).await.unwrap();
        let task = lifecycle.task(partitioned.id).await.unwrap();
        assert!(!task.running);
        assert!(task.end_time.is_some());
        assert_eq!(
            partition_statuses(&env, partitioned).await,
            vec![MigrationStatus::Done, MigrationStatus::Done]
        );

        lifecycle.set_status(whole.id, TaskStatus::SchemaFailed).await.unwrap();
        assert_eq!(table_status(&env, whole.table_id).await, MigrationStatus::Failed);
    }

    #[tokio::test]
    async fn test_stop_and_retry_job() {
        let env = TestEnv::refreshed().await;
        let (job_id, tasks) = submitted(&env).await;
        let lifecycle = TaskLifecycle::new(&env.pool);
        assert_eq!(lifecycle.list_runnable(10).await.unwrap().len(), 2);

        lifecycle.set_status(tasks[0].id, TaskStatus::DataFailed).await.unwrap();
        lifecycle.stop_job(job_id).await.unwrap();
        assert!(lifecycle.job(job_id).await.unwrap().stopped);
        assert!(lifecycle.list_runnable(10).await.unwrap().is_empty());
        // 状态不受停止影响
        assert_eq!(
            lifecycle.task(tasks[0].id).await.unwrap().status,
            TaskStatus::DataFailed
        );

        let restarted = lifecycle.retry_job(job_id).await.unwrap();
        assert_eq!(restarted, 1);
        assert!(!lifecycle.job(job_id).await.unwrap().stopped);
        let runnable: Vec<i64> = lifecycle
            .list_runnable(10)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(runnable, vec![tasks[0].id, tasks[1].id]);

        let picked = lifecycle.pick_up(tasks[0].id).await.unwrap();
        assert!(picked.running && !picked.restart);
        assert!(picked.start_time.is_some());
    }

    #[tokio::test]
    async fn test_stop_and_restart_task() {
        let env = TestEnv::refreshed().await;
        let (_, tasks) = submitted(&env).await;
        let lifecycle = TaskLifecycle::new(&env.pool);
        let id = tasks[0].id;

        assert_eq!(lifecycle.restart_task(id).await.unwrap_err().kind(), "invalid_input");

        lifecycle.pick_up(id).await.unwrap();
        lifecycle.set_status(id, TaskStatus::SchemaDoing).await.unwrap();
        lifecycle.stop_task(id).await.unwrap();
        let task = lifecycle.task(id).await.unwrap();
        assert!(task.stopped && !task.running);
        assert_eq!(task.status, TaskStatus::SchemaDoing);
        assert!(lifecycle.pick_up(id).await.is_err());

        lifecycle.restart_task(id).await.unwrap();
        let task = lifecycle.task(id).await.unwrap();
        assert!(task.restart && !task.stopped);
        assert!(lifecycle.list_runnable(10).await.unwrap().iter().any(|t| t.id == id));
    }

    #[tokio::test]
    async fn test_reset_task_returns_partitions_to_init() {
        let env = TestEnv::refreshed().await;
        let (_, tasks) = submitted(&env).await;
        let lifecycle = TaskLifecycle::new(&env.pool);
        let task = tasks.iter().find(|t| !t.partitions.is_empty()).unwrap();

        lifecycle.pick_up(task.id).await.unwrap();
        lifecycle.set_status(task.id, TaskStatus::VerificationFailed).await.unwrap();
        lifecycle.reset_task(task.id).await.unwrap();

        let reset = lifecycle.task(task.id).await.unwrap();
        assert_eq!(reset.status, TaskStatus::Init);
        assert!(reset.start_time.is_none() && reset.end_time.is_none());
        assert_eq!(
            partition_statuses(&env, task).await,
            vec![MigrationStatus::Init, MigrationStatus::Init]
        );
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let env = TestEnv::new().await;
        let lifecycle = TaskLifecycle::new(&env.pool);
        assert_eq!(lifecycle.stop_job(404).await.unwrap_err().kind(), "not_found");
        assert_eq!(lifecycle.reset_task(404).await.unwrap_err().kind(), "not_found");
        assert_eq!(lifecycle.tasks_of_job(404).await.unwrap_err().kind(), "not_found");
    }
}
