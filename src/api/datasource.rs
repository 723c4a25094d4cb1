use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::AppState;
use crate::models::{CreateDataSourceRequest, DataSource, RefreshProgressView, SourceConfig};
use crate::services::{CatalogSynchronizer, DataSourceService};
use crate::utils::error::AppError;

/// 注册数据源
pub async fn create_datasource(
    State(state): State<AppState>,
    Json(request): Json<CreateDataSourceRequest>,
) -> Result<Json<DataSource>, ApiError> {
    let source = DataSourceService::new(&state.pool, &state.crawlers)
        .register(request)
        .await?;
    Ok(Json(source))
}

/// 获取所有数据源
pub async fn list_datasources(
    State(state): State<AppState>,
) -> Result<Json<Vec<DataSource>>, ApiError> {
    let sources = DataSourceService::new(&state.pool, &state.crawlers).list().await?;
    Ok(Json(sources))
}

pub async fn get_datasource(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DataSource>, ApiError> {
    let source = DataSourceService::new(&state.pool, &state.crawlers)
        .get(&name)
        .await?;
    Ok(Json(source))
}

/// 更新数据源配置
pub async fn update_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(config): Json<SourceConfig>,
) -> Result<Json<DataSource>, ApiError> {
    let source = DataSourceService::new(&state.pool, &state.crawlers)
        .update_config(&name, config)
        .await?;
    Ok(Json(source))
}

/// 在后台刷新目录，立即返回
pub async fn refresh(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    DataSourceService::new(&state.pool, &state.crawlers)
        .get(&name)
        .await?;
    if state.progress.get(&name).is_some() {
        return Err(AppError::RefreshInProgress(name).into());
    }

    let task_state = state.clone();
    let task_name = name.clone();
    tokio::spawn(async move {
        let synchronizer = CatalogSynchronizer::new(
            &task_state.pool,
            &task_state.settings,
            &task_state.crawlers,
            &task_state.progress,
        );
        if let Err(e) = synchronizer.refresh(&task_name).await {
            tracing::error!("Background refresh of {} failed: {}", task_name, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "name": name, "started": true })),
    ))
}

/// 刷新进度
pub async fn get_progress(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RefreshProgressView>, ApiError> {
    let view = DataSourceService::new(&state.pool, &state.crawlers)
        .refresh_progress(&name, &state.progress)
        .await?;
    Ok(Json(view))
}

/// Axum 错误处理
#[derive(Debug)]
pub struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::JobConfig { .. } | AppError::NoTablesFound(_) | AppError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::TaskConflict(_) | AppError::RefreshInProgress(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
