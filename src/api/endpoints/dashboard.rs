//! Dashboard endpoints, thin wrappers over the aggregation module.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::dashboard;

/// `GET /api/dashboard/stats`
pub async fn stats(State(ctx): State<ApiContext>) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let conn = ctx.lock_db()?;
    let data = dashboard::overview(&conn, now)?;
    Ok(Json(json!({
        "data": data,
        "generated_at": now.to_rfc3339(),
    })))
}

/// `GET /api/dashboard/activities`
pub async fn activities(State(ctx): State<ApiContext>) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let feed = dashboard::activities(&conn, Utc::now())?;
    Ok(Json(json!({"data": feed})))
}

/// `GET /api/dashboard/notifications`
pub async fn notifications(State(ctx): State<ApiContext>) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let items = dashboard::notifications(&conn, Utc::now().date_naive())?;
    let total = items.len();
    Ok(Json(json!({
        "data": items,
        "total": total,
        "unread_count": total,
    })))
}
