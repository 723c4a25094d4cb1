use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use super::datasource::ApiError;
use super::AppState;
use crate::models::{Job, JobRequest, Task};
use crate::services::{JobSubmitter, TaskLifecycle};

/// 提交作业
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = JobSubmitter::new(&state.pool, &state.settings, &state.ids, &state.locks)
        .submit(request)
        .await?;
    Ok(Json(json!({ "job_id": job_id })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    let job = TaskLifecycle::new(&state.pool).job(id).await?;
    Ok(Json(job))
}

/// 作业下的全部任务
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = TaskLifecycle::new(&state.pool).tasks_of_job(id).await?;
    Ok(Json(tasks))
}

pub async fn stop_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    TaskLifecycle::new(&state.pool).stop_job(id).await?;
    Ok(Json(json!({ "success": true })))
}

/// 重试作业里失败的任务
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let restarted = TaskLifecycle::new(&state.pool).retry_job(id).await?;
    Ok(Json(json!({ "success": true, "restarted": restarted })))
}
