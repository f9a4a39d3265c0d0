use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::aggregate::{ItemQuery, Page, Stats};
use crate::db::Database;
use crate::fetcher::Fetcher;
use crate::model::{Feed, Item};
use crate::trending::{TrendingWindow, DEFAULT_TRENDING_LIMIT};

pub struct AppState {
    pub db: Arc<Database>,
    pub fetcher: Arc<Fetcher>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/feeds", get(list_feeds).post(add_feed))
        .route("/feeds/:id", get(get_feed).delete(delete_feed))
        .route("/feeds/:id/items", get(list_items).post(add_item))
        .route("/feeds/:id/items/:item_id", get(get_item))
        .route("/feeds/:id/trending/:window", get(feed_trending))
        .route("/items", get(list_all_items))
        .route("/items/:id/views", post(track_view))
        .route("/categories", get(list_categories))
        .route("/categories/:name/items", get(items_by_category))
        .route("/categories/:name/feeds", get(feeds_by_category))
        .route("/trending/:window", get(trending))
        .route("/stats", get(stats))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": what }))).into_response()
            }
            AppError::BadRequest(why) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": why }))).into_response()
            }
            AppError::Internal(err) => {
                // The cause chain stays in the logs.
                error!("Request failed: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal storage error" })),
                )
                    .into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError::Internal(err.into())
    }
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default = "default_trending_limit")]
    pub limit: usize,
}

fn default_trending_limit() -> usize {
    DEFAULT_TRENDING_LIMIT
}

fn parse_window(window: &str) -> Result<TrendingWindow, AppError> {
    window
        .parse()
        .map_err(|e: crate::trending::UnknownWindow| AppError::BadRequest(e.to_string()))
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

pub async fn list_feeds(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Feed>>, AppError> {
    Ok(Json(state.db.list_feeds().await?))
}

pub async fn add_feed(
    State(state): State<Arc<AppState>>,
    Json(feed): Json<Feed>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.db.add_feed(feed).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<Feed>, AppError> {
    state
        .db
        .get_feed(&feed_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("feed `{feed_id}` not found")))
}

pub async fn delete_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.db.delete_feed(&feed_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<Vec<Item>>, AppError> {
    Ok(Json(state.db.list_items(&feed_id).await?))
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
    Json(item): Json<Item>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.db.add_item(&feed_id, item).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path((feed_id, item_id)): Path<(String, String)>,
) -> Result<Json<Item>, AppError> {
    state
        .db
        .get_item(&feed_id, &item_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("item `{item_id}` not found")))
}

pub async fn list_all_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<Item>>, AppError> {
    Ok(Json(state.db.list_all_items(&query).await?))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.db.list_categories().await?))
}

pub async fn items_by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Item>>, AppError> {
    Ok(Json(state.db.list_items_by_category(&category, page).await?))
}

pub async fn feeds_by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Feed>>, AppError> {
    Ok(Json(state.db.list_feeds_by_category(&category).await?))
}

pub async fn track_view(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.db.track_view(&item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
    Path(window): Path<String>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<Item>>, AppError> {
    let window = parse_window(&window)?;
    Ok(Json(state.db.get_trending(window, query.limit).await?))
}

pub async fn feed_trending(
    State(state): State<Arc<AppState>>,
    Path((feed_id, window)): Path<(String, String)>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<Item>>, AppError> {
    let window = parse_window(&window)?;
    Ok(Json(
        state
            .db
            .get_feed_trending(&feed_id, window, query.limit)
            .await?,
    ))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, AppError> {
    Ok(Json(state.db.get_stats().await?))
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let fetcher = state.fetcher.clone();
    tokio::spawn(async move {
        if let Err(e) = fetcher.refresh_all_feeds().await {
            error!("Manual feed refresh failed: {}", e);
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "refreshing": true })))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let refreshing = state.fetcher.is_refreshing().await;
    Json(json!({ "refreshing": refreshing }))
}
