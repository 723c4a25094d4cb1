use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use super::datasource::ApiError;
use super::AppState;
use crate::models::Task;
use crate::services::TaskLifecycle;

/// 获取任务详情
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    let task = TaskLifecycle::new(&state.pool).task(id).await?;
    Ok(Json(task))
}

pub async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    TaskLifecycle::new(&state.pool).stop_task(id).await?;
    Ok(Json(json!({ "success": true })))
}

/// 标记重跑
pub async fn restart_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    TaskLifecycle::new(&state.pool).restart_task(id).await?;
    Ok(Json(json!({ "success": true })))
}

/// 重置到初始状态
pub async fn reset_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    TaskLifecycle::new(&state.pool).reset_task(id).await?;
    Ok(Json(json!({ "success": true })))
}
