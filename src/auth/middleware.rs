use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{TokenGenerator, TokenKind, parse_token};
use crate::server::AppState;
use crate::store::{SqliteStore, Store};
use crate::types::AdminToken;

/// Extractor that requires a valid admin bearer token.
pub struct RequireAdmin(pub AdminToken);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "message": message, "code": status.as_u16() });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                axum::http::HeaderValue::from_static("Bearer realm=\"groundctl\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingAuth)?;

        let raw_token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidScheme)?
            .trim();

        let token = validate_admin_token(state, raw_token).await?;
        Ok(RequireAdmin(token))
    }
}

async fn validate_admin_token(state: &AppState, raw_token: &str) -> Result<AdminToken, AuthError> {
    let lookup = parse_token(TokenKind::Admin, raw_token).map_err(|_| AuthError::InvalidToken)?;

    let token = {
        let conn = state
            .store
            .reader()
            .await
            .map_err(|_| AuthError::InternalError)?;
        conn.get_admin_token_by_lookup(&lookup)
            .map_err(|_| AuthError::InternalError)?
            .ok_or(AuthError::InvalidToken)?
    };

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| AuthError::InternalError)?
    {
        return Err(AuthError::InvalidToken);
    }

    touch_admin_token(state.store.clone(), token.id.clone());
    Ok(token)
}

/// Records usage off the request path; the writer may be busy with a sync.
fn touch_admin_token(store: SqliteStore, id: String) {
    tokio::spawn(async move {
        let result = match store.connection().await {
            Ok(conn) => conn.update_admin_token_last_used(&id),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to update token last_used_at: {e}");
        }
    });
}
