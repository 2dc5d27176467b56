use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{CurrentUser, SessionResolver, SqliteSessions};
use crate::chat::{self, ProviderRoute};
use crate::config::ChatConfig;
use crate::db::SqliteStore;
use crate::error::{ApiError, ApiResult};
use crate::llm::{ChatProvider, GeminiClient, OpenAiClient};
use crate::models::{ChatRecord, ChatRequest, ChatSummary};
use crate::persist::ChatStore;

const STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/**
 * \brief Shared, read-only handler state.
 */
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ChatConfig>,
    pub sessions: Arc<dyn SessionResolver>,
    pub store: Arc<dyn ChatStore>,
    pub gemini: Arc<dyn ChatProvider>,
    pub openrouter: Arc<dyn ChatProvider>,
}

impl AppState {
    /**
     * \brief Wires the SQLite store/sessions and the HTTP provider clients from `config`.
     */
    pub fn from_config(config: ChatConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path)?;
        Ok(Self {
            sessions: Arc::new(SqliteSessions::new(store.clone())),
            store: Arc::new(store),
            gemini: Arc::new(GeminiClient::new(config.gemini_api_base.clone())),
            openrouter: Arc::new(OpenAiClient::new(config.openrouter_api_base.clone())),
            config: Arc::new(config),
        })
    }

    pub fn provider(&self, route: ProviderRoute) -> &dyn ChatProvider {
        match route {
            ProviderRoute::Google => self.gemini.as_ref(),
            ProviderRoute::OpenRouter => self.openrouter.as_ref(),
        }
    }
}

/**
 * \brief Builds the API router.
 */
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/google", post(chat_google))
        .route("/api/chat/openrouter", post(chat_openrouter))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/{id}", get(get_chat).delete(remove_chat))
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/**
 * \brief Serves the API on `addr`, e.g. "127.0.0.1:3000".
 */
pub async fn run(addr: &str, state: AppState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief POST /api/chat/google
 */
async fn chat_google(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    stream_chat(state, ProviderRoute::Google, user, body).await
}

/**
 * \brief POST /api/chat/openrouter
 */
async fn chat_openrouter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    stream_chat(state, ProviderRoute::OpenRouter, user, body).await
}

async fn stream_chat(
    state: AppState,
    route: ProviderRoute,
    user: crate::models::SessionUser,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let stream = chat::start_chat(&state, route, request, user).await?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, STREAM_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response())
}

/**
 * \brief GET /api/chats, newest first.
 */
async fn list_chats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let chats = state.store.list_chats(&user.id).await?;
    Ok(Json(chats))
}

async fn get_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatRecord>> {
    state
        .store
        .get_chat(&user.id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("chat {} not found", id)))
}

async fn remove_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.store.delete_chat(&user.id, &id).await? {
        tracing::info!(chat_id = %id, user_id = %user.id, "chat deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("chat {} not found", id)))
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
