//! HTTP surface of the backend: Notion pass-through proxy, CRUD over the
//! local store, the sync trigger and the AI endpoints.
//!
//! Every response carries permissive CORS headers for the browser client,
//! and every error surfaces as `{"error": message}` with a non-2xx status.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db::{self, NewPage, NewView, PagePatch, TopicPatch};
use crate::insight::InsightClient;
use crate::model::TopicRow;
use crate::notion::{NotionClient, NotionSource};
use crate::sync::{run_full_sync, SyncOptions};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: db::Pool,
    pub notion: NotionClient,
    pub insight: InsightClient,
}

/// Build the router with all routes and the permissive CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/ask-ai", post(handle_ask_ai))
        .route("/api/revision-insights", post(handle_revision_insights))
        .route("/api/notion/*path", any(handle_notion_proxy))
        .route("/api/db/topics", get(handle_list_topics).post(handle_create_topic))
        .route(
            "/api/db/topics/:id",
            axum::routing::patch(handle_update_topic).delete(handle_delete_topic),
        )
        .route("/api/db/pages", get(handle_list_pages).post(handle_create_page))
        .route(
            "/api/db/pages/:id",
            get(handle_get_page)
                .patch(handle_update_page)
                .delete(handle_delete_page),
        )
        .route("/api/db/pages/:id/children", get(handle_page_children))
        .route("/api/db/content/:source_id", get(handle_get_content))
        .route("/api/db/views", get(handle_list_views).post(handle_create_view))
        .route("/api/db/sync-from-notion", post(handle_sync))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind = state.config.app.bind.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ---- error envelope ----

/// Error response carrying the uniform `{"error": message}` envelope.
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn body(&self) -> Value {
        json!({ "error": self.message })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.body();
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(?err, "request failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, message)
}

// ---- health ----

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---- AI endpoints ----

#[derive(Debug, Default, Deserialize)]
struct AskRequest {
    #[serde(default)]
    prompt: String,
}

async fn handle_ask_ai(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Value>, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(bad_request("Missing prompt"));
    }
    let response = state.insight.ask(&req.prompt).await.map_err(|err| {
        error!(?err, "Gemini request failed");
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate AI response",
        )
    })?;
    Ok(Json(json!({ "response": response })))
}

async fn handle_revision_insights(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let topics = body
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| bad_request("Invalid topics data"))?;
    let insights = state
        .insight
        .revision_insights(topics)
        .await
        .map_err(|err| {
            error!(?err, "insight generation failed");
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate insights",
            )
        })?;
    Ok(Json(insights))
}

// ---- Notion proxy ----

async fn handle_notion_proxy(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    body: Option<Json<Value>>,
) -> Result<Response, AppError> {
    let path = format!("/{path}");
    info!(%method, %path, "proxying Notion request");
    let body = body.as_ref().map(|Json(v)| v);
    let (status, payload) = state.notion.proxy(method.as_str(), &path, body).await?;
    let status =
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(payload)).into_response())
}

// ---- topics ----

async fn handle_list_topics(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let topics = db::list_topics(&state.pool).await?;
    Ok(Json(json!(topics)))
}

async fn handle_create_topic(
    State(state): State<AppState>,
    Json(row): Json<TopicRow>,
) -> Result<Json<Value>, AppError> {
    if row.source_id.trim().is_empty() {
        return Err(bad_request("source_id must be non-empty"));
    }
    let stored = db::create_topic(&state.pool, &row).await?;
    Ok(Json(json!(stored)))
}

async fn handle_update_topic(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<TopicPatch>,
) -> Result<Json<Value>, AppError> {
    match db::update_topic(&state.pool, id, &patch).await? {
        Some(topic) => Ok(Json(json!(topic))),
        None => Err(not_found("Topic not found")),
    }
}

async fn handle_delete_topic(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    if db::delete_topic(&state.pool, id).await? {
        Ok(Json(json!({ "deleted": true, "id": id })))
    } else {
        Err(not_found("Topic not found"))
    }
}

// ---- pages ----

async fn handle_list_pages(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let pages = db::list_root_pages(&state.pool).await?;
    Ok(Json(json!(pages)))
}

async fn handle_get_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    match db::get_page(&state.pool, id).await? {
        Some(page) => Ok(Json(json!(page))),
        None => Err(not_found("Page not found")),
    }
}

async fn handle_page_children(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let pages = db::list_child_pages(&state.pool, id).await?;
    Ok(Json(json!(pages)))
}

async fn handle_create_page(
    State(state): State<AppState>,
    Json(page): Json<NewPage>,
) -> Result<Json<Value>, AppError> {
    let stored = db::create_page(&state.pool, &page).await?;
    Ok(Json(json!(stored)))
}

async fn handle_update_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<PagePatch>,
) -> Result<Json<Value>, AppError> {
    match db::update_page(&state.pool, id, &patch).await? {
        Some(page) => Ok(Json(json!(page))),
        None => Err(not_found("Page not found")),
    }
}

async fn handle_delete_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    if db::delete_page(&state.pool, id).await? {
        Ok(Json(json!({ "deleted": true, "id": id })))
    } else {
        Err(not_found("Page not found"))
    }
}

// ---- content & views ----

async fn handle_get_content(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let blocks = db::get_page_content(&state.pool, &source_id)
        .await?
        .unwrap_or_default();
    Ok(Json(json!({ "results": blocks })))
}

async fn handle_list_views(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let views = db::list_views(&state.pool).await?;
    Ok(Json(json!(views)))
}

async fn handle_create_view(
    State(state): State<AppState>,
    Json(view): Json<NewView>,
) -> Result<Json<Value>, AppError> {
    if view.name.trim().is_empty() {
        return Err(bad_request("name must be non-empty"));
    }
    let stored = db::create_view(&state.pool, &view).await?;
    Ok(Json(json!(stored)))
}

// ---- sync trigger ----

async fn handle_sync(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let source = NotionSource::new(state.notion.clone(), state.config.notion.database_id.clone());
    let store = db::SqliteStore::new(state.pool.clone());
    let opts = SyncOptions {
        page_size: state.config.sync.page_size,
        batch_size: state.config.sync.batch_size,
    };
    let summary = run_full_sync(&source, &store, opts)
        .await
        .map_err(|err| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(json!({ "status": "success", "summary": summary })))
}
