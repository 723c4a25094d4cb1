pub mod datasource;
pub mod job;
pub mod task;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::{CrawlerRegistry, IdAllocator, ProgressRegistry};
use crate::settings::Settings;
use crate::utils::KeyLock;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub settings: Arc<Settings>,
    pub ids: Arc<IdAllocator>,
    pub progress: Arc<ProgressRegistry>,
    pub crawlers: Arc<CrawlerRegistry>,
    pub locks: Arc<KeyLock>,
}

impl AppState {
    pub fn new(pool: SqlitePool, settings: Settings, ids: IdAllocator, crawlers: CrawlerRegistry) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            ids: Arc::new(ids),
            progress: Arc::new(ProgressRegistry::new()),
            crawlers: Arc::new(crawlers),
            locks: Arc::new(KeyLock::new()),
        }
    }
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "catalog-migrator"
    }))
}

/// 创建 API 路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(health_check))

        // 数据源
        .route(
            "/api/datasources",
            post(datasource::create_datasource).get(datasource::list_datasources),
        )
        .route("/api/datasources/:name", get(datasource::get_datasource))
        .route("/api/datasources/:name/config", put(datasource::update_config))
        .route("/api/datasources/:name/refresh", post(datasource::refresh))
        .route("/api/datasources/:name/progress", get(datasource::get_progress))

        // 作业
        .route("/api/jobs", post(job::submit_job))
        .route("/api/jobs/:id", get(job::get_job))
        .route("/api/jobs/:id/tasks", get(job::list_tasks))
        .route("/api/jobs/:id/stop", post(job::stop_job))
        .route("/api/jobs/:id/retry", post(job::retry_job))

        // 任务
        .route("/api/tasks/:id", get(task::get_task))
        .route("/api/tasks/:id/stop", post(task::stop_task))
        .route("/api/tasks/:id/restart", post(task::restart_task))
        .route("/api/tasks/:id/reset", post(task::reset_task))

        // CORS 配置
        .layer(CorsLayer::permissive())
        // 请求追踪
        .layer(TraceLayer::new_for_http())

        // 共享状态
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InitStatus, SourceType};
    use crate::services::MetadataCrawler;
    use crate::test_support::{memory_pool, scenario_crawler};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let crawler = scenario_crawler();
        let mut crawlers = CrawlerRegistry::new();
        crawlers.register(
            SourceType::Hive,
            Arc::new(move || crawler.clone() as Arc<dyn MetadataCrawler>),
        );
        AppState::new(
            memory_pool().await,
            Settings::for_tests(),
            IdAllocator::new(0, 0),
            crawlers,
        )
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// 注册 hive1 并等后台刷新结束
    async fn registered_and_refreshed(state: &AppState) {
        let (status, _) = call(
            state,
            "POST",
            "/api/datasources",
            Some(json!({ "name": "hive1", "source_type": "hive" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(state, "POST", "/api/datasources/hive1/refresh", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        for _ in 0..100 {
            let (_, view) = call(state, "GET", "/api/datasources/hive1/progress", None).await;
            if view["init_status"] == InitStatus::Ok.as_str() && view["running"] == false {
                assert_eq!(view["progress"], 100.0);
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("refresh did not finish");
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state().await;
        let (status, body) = call(&state, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_datasource_endpoints() {
        let state = test_state().await;
        registered_and_refreshed(&state).await;

        let (status, body) = call(&state, "GET", "/api/datasources", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = call(&state, "GET", "/api/datasources/hive1", None).await;
        assert_eq!(body["table_num"], 2);
        assert_eq!(body["partition_num"], 2);

        let (status, body) = call(
            &state,
            "PUT",
            "/api/datasources/hive1/config",
            Some(json!({ "table_blacklist": ["*.t2"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["table_blacklist"][0], "*.t2");

        let (status, body) = call(&state, "GET", "/api/datasources/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_job_and_task_endpoints() {
        let state = test_state().await;
        registered_and_refreshed(&state).await;

        let job = json!({
            "source_name": "hive1",
            "db_name": "d",
            "job_type": "tables",
            "config": { "tables": ["t1"], "partition_group_size": 1 }
        });
        let (status, body) = call(&state, "POST", "/api/jobs", Some(job.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let job_id = body["job_id"].as_i64().unwrap();

        let (status, body) = call(&state, "POST", "/api/jobs", Some(job)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "task_conflict");
        assert!(body["error"].as_str().unwrap().contains("d.t1"));

        let (_, tasks) = call(&state, "GET", &format!("/api/jobs/{}/tasks", job_id), None).await;
        let tasks = tasks.as_array().unwrap();
        assert_eq!(tasks.len(), 2);
        let task_id = tasks[0]["id"].as_i64().unwrap();

        let (status, _) = call(&state, "POST", &format!("/api/tasks/{}/stop", task_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, task) = call(&state, "GET", &format!("/api/tasks/{}", task_id), None).await;
        assert_eq!(task["stopped"], true);

        let (status, _) = call(&state, "POST", &format!("/api/tasks/{}/reset", task_id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&state, "POST", &format!("/api/jobs/{}/stop", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&state, "GET", &format!("/api/jobs/{}", job_id), None).await;
        assert_eq!(body["stopped"], true);

        let (_, body) = call(&state, "POST", &format!("/api/jobs/{}/retry", job_id), None).await;
        assert_eq!(body["restarted"], 0);

        let (status, body) = call(&state, "GET", "/api/tasks/9999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_job_config_error_is_bad_request() {
        let state = test_state().await;
        registered_and_refreshed(&state).await;

        let job = json!({
            "source_name": "hive1",
            "db_name": "d",
            "job_type": "tables",
            "config": { "tables": ["t1"], "partition_filters": { "t1": "day >= 3" } }
        });
        let (status, body) = call(&state, "POST", "/api/jobs", Some(job)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "job_config");
    }
}
