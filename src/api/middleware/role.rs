//! Role guard middleware. Layered inside `require_auth`, so a missing
//! `AuthUser` means the request never authenticated.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::AuthUser;
use crate::authorization::authorize;
use crate::models::Role;

/// Admin-only routes: 403 with role diagnostics for everyone else.
pub async fn require_admin(req: Request<axum::body::Body>, next: Next) -> Response {
    let role = req.extensions().get::<AuthUser>().map(|u| u.role);
    match authorize(role, &[Role::Admin]) {
        Ok(()) => next.run(req).await,
        Err(denied) => ApiError::from(denied).into_response(),
    }
}
