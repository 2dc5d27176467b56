use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::db::{self, SqliteStore};
use crate::error::ApiError;
use crate::models::SessionUser;
use crate::server::AppState;

/**
 * \brief Resolves the caller of a request to a user, if any.
 */
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<SessionUser>>;
}

/**
 * \brief Token from an `Authorization: Bearer ...` header.
 */
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/**
 * \brief Fresh opaque session token.
 */
pub fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/**
 * \brief Bearer tokens looked up in the `sessions` table.
 */
#[derive(Debug, Clone)]
pub struct SqliteSessions {
    store: SqliteStore,
}

impl SqliteSessions {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionResolver for SqliteSessions {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<SessionUser>> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };
        let token = token.to_string();
        self.store
            .with_conn(move |conn| db::find_session(conn, &token))
            .await
    }
}

/**
 * \brief Authenticated caller; rejects with 401 before the body is read.
 */
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.sessions.resolve(&parts.headers).await? {
            Some(user) if !user.id.is_empty() => Ok(CurrentUser(user)),
            _ => {
                tracing::debug!(uri = %parts.uri, "rejecting request without session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  spaced "));
        assert_eq!(bearer_token(&headers), Some("spaced"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
