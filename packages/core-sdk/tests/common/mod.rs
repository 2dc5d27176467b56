#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, Response},
};
use futures_util::stream;
use http_body_util::BodyExt;
use tower::ServiceExt;

use chatbridge_core_sdk::{
    auth::{bearer_token, SessionResolver},
    config::ChatConfig,
    error::LlmError,
    llm::{ChatProvider, ProviderCall, TokenStream},
    models::{ChatRecord, ChatSummary, SessionUser},
    persist::ChatStore,
    server::{self, AppState},
};

pub const GOOD_TOKEN: &str = "good-token";

/** Accepts only `GOOD_TOKEN`, resolving it to user `u1` named Ada. */
pub struct FixedSessions;

#[async_trait]
impl SessionResolver for FixedSessions {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<SessionUser>> {
        Ok(match bearer_token(headers) {
            Some(GOOD_TOKEN) => Some(SessionUser {
                id: "u1".into(),
                name: Some("Ada".into()),
            }),
            _ => None,
        })
    }
}

/** Replays fixed chunks and records every call it receives. */
pub struct MockProvider {
    chunks: Vec<&'static str>,
    fail: bool,
    pub calls: Mutex<Vec<ProviderCall>>,
}

impl MockProvider {
    pub fn new(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            chunks: Vec::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("lock calls").clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn stream_chat(&self, call: &ProviderCall) -> Result<TokenStream, LlmError> {
        self.calls.lock().expect("lock calls").push(call.clone());
        if self.fail {
            return Err(LlmError::Decode("invalid api key".into()));
        }
        let items = self
            .chunks
            .iter()
            .map(|c| Ok(c.to_string()))
            .collect::<Vec<_>>();
        Ok(Box::pin(stream::iter(items)))
    }
}

/** In-memory `ChatStore` that keeps every save. */
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Vec<ChatRecord>>,
}

impl MemoryStore {
    pub fn saved(&self) -> Vec<ChatRecord> {
        self.saved.lock().expect("lock saved").clone()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn save_chat(&self, record: ChatRecord) -> Result<()> {
        self.saved.lock().expect("lock saved").push(record);
        Ok(())
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        Ok(self
            .saved()
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| ChatSummary {
                id: r.id,
                title: r.title,
                path: r.path,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<ChatRecord>> {
        Ok(self
            .saved()
            .into_iter()
            .rev()
            .find(|r| r.user_id == user_id && r.id == chat_id))
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        let mut saved = self.saved.lock().expect("lock saved");
        let before = saved.len();
        saved.retain(|r| !(r.user_id == user_id && r.id == chat_id));
        Ok(saved.len() != before)
    }
}

pub fn test_config() -> ChatConfig {
    ChatConfig {
        gemini_api_key: "env-gemini-key".into(),
        openrouter_api_key: "env-openrouter-key".into(),
        ..ChatConfig::default()
    }
}

pub fn state_with(
    gemini: Arc<dyn ChatProvider>,
    openrouter: Arc<dyn ChatProvider>,
    store: Arc<dyn ChatStore>,
) -> AppState {
    AppState {
        config: Arc::new(test_config()),
        sessions: Arc::new(FixedSessions),
        store,
        gemini,
        openrouter,
    }
}

pub fn post_json(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).expect("build request")
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("build request")
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("build request")
}

pub async fn send(state: AppState, request: Request<Body>) -> Response<Body> {
    server::router(state)
        .oneshot(request)
        .await
        .expect("router is infallible")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
