//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves its hash against the
//! tokens table (auth kind only; refresh tokens are rejected here) and
//! injects `AuthUser` + `CurrentToken` into request extensions.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{hash_token, ApiContext, AuthUser, CurrentToken};
use crate::db::repository::token;
use crate::models::TokenKind;

pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?
        .to_string();

    let token_hash = hash_token(&bearer);
    let user = {
        let conn = ctx.lock_db()?;
        token::find_user_by_token(&conn, &token_hash, TokenKind::Auth)?
    }; // MutexGuard dropped before the .await below

    let user = user.ok_or(ApiError::Unauthenticated)?;

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
    });
    req.extensions_mut().insert(CurrentToken(token_hash));

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}
