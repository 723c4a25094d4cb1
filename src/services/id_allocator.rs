use crate::db::{JobRepository, TaskRepository};
use crate::utils::error::Result;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};

/// 作业和任务 id 的进程内分配器
///
/// 启动时从库里的最大 id 起步，之后只增不减。多个进程共用一个库时不安全。
#[derive(Debug, Default)]
pub struct IdAllocator {
    job: AtomicI64,
    task: AtomicI64,
}

impl IdAllocator {
    /// `job`/`task` 是已经用掉的最大 id
    pub fn new(job: i64, task: i64) -> Self {
        Self {
            job: AtomicI64::new(job),
            task: AtomicI64::new(task),
        }
    }

    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let job = JobRepository::new(pool).max_id().await?;
        let task = TaskRepository::new(pool).max_id().await?;
        tracing::info!("Id allocator seeded with job id {} and task id {}", job, task);
        Ok(Self::new(job, task))
    }

    pub fn next_job_id(&self) -> i64 {
        self.job.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_task_id(&self) -> i64 {
        self.task.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 一次取 `count` 个连续的任务 id
    pub fn next_task_ids(&self, count: usize) -> Vec<i64> {
        let first = self.task.fetch_add(count as i64, Ordering::SeqCst) + 1;
        (first..first + count as i64).collect()
    }
}
