//! Admin-only user management.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::types::{hash_password, ApiContext, Paginated};
use crate::db::repository::{token, user};
use crate::models::{PageRequest, Role, User, DEFAULT_PER_PAGE};
use crate::validation::{self, FieldErrors};

const MIN_PASSWORD: usize = 8;

fn transform_user(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role.as_str(),
        "role_label": user.role.label(),
        "email_verified_at": user.email_verified_at.map(|t| t.to_rfc3339()),
        "created_at": user.created_at.to_rfc3339(),
    })
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `GET /api/users`
pub async fn index(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Value>>, ApiError> {
    let page = PageRequest::new(query.page, query.per_page, DEFAULT_PER_PAGE);

    let conn = ctx.lock_db()?;
    let (users, total) = user::list_users(&conn, page)?;

    let data = users.iter().map(transform_user).collect();
    Ok(Json(Paginated::new(data, page, total)))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub role: Option<String>,
}

/// `POST /api/users`
pub async fn store(
    State(ctx): State<ApiContext>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let conn = ctx.lock_db()?;

    let mut errors = FieldErrors::new();
    if let Some(name) = validation::require(&mut errors, "name", body.name.as_deref()) {
        validation::check_max_len(&mut errors, "name", name, 255);
    }
    if let Some(email) = validation::require(&mut errors, "email", body.email.as_deref()) {
        if validation::check_email(&mut errors, "email", email)
            && user::email_exists(&conn, email, None)?
        {
            errors.add("email", "The email has already been taken.");
        }
    }
    if let Some(password) = validation::require(&mut errors, "password", body.password.as_deref()) {
        validation::check_min_len(&mut errors, "password", password, MIN_PASSWORD);
        if body.password_confirmation.as_deref() != Some(password) {
            errors.add("password", "The password field confirmation does not match.");
        }
    }
    let role: Option<Role> = validation::require(&mut errors, "role", body.role.as_deref())
        .and_then(|raw| validation::parse_enum(&mut errors, "role", raw));
    errors.into_result()?;

    let created = user::insert_user(
        &conn,
        &user::NewUser {
            name: body.name.unwrap_or_default(),
            email: body.email.unwrap_or_default(),
            password_hash: hash_password(body.password.as_deref().unwrap_or_default())?,
            role: role.unwrap_or(Role::Staff),
            phone: None,
            address: None,
            date_of_birth: None,
            gender: None,
            specialization: None,
            license_number: None,
            email_verified_at: Some(Utc::now()),
        },
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User berhasil dibuat",
            "data": transform_user(&created),
        })),
    ))
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// `PUT /api/users/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let mut found = user::find_user(&conn, id)?
        .ok_or_else(|| ApiError::NotFound("User tidak ditemukan".into()))?;

    let mut errors = FieldErrors::new();
    if let Some(name) = &body.name {
        if name.is_empty() {
            errors.add("name", "The name field is required.");
        } else {
            validation::check_max_len(&mut errors, "name", name, 255);
        }
    }
    if let Some(email) = &body.email {
        if email.is_empty() {
            errors.add("email", "The email field is required.");
        } else if validation::check_email(&mut errors, "email", email)
            && user::email_exists(&conn, email, Some(found.id))?
        {
            errors.add("email", "The email has already been taken.");
        }
    }
    let role: Option<Role> = body
        .role
        .as_deref()
        .and_then(|raw| validation::parse_enum(&mut errors, "role", raw));
    errors.into_result()?;

    if let Some(name) = body.name {
        found.name = name;
    }
    if let Some(email) = body.email {
        found.email = email;
    }
    if let Some(role) = role {
        found.role = role;
    }
    user::update_user(&conn, &found)?;
    let found = user::find_user(&conn, found.id)?
        .ok_or_else(|| ApiError::NotFound("User tidak ditemukan".into()))?;

    Ok(Json(json!({
        "message": "User berhasil diperbarui",
        "data": transform_user(&found),
    })))
}

/// `DELETE /api/users/:id` — also revokes every token of the user.
pub async fn destroy(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    token::revoke_all_tokens(&conn, id)?;
    if !user::delete_user(&conn, id)? {
        return Err(ApiError::NotFound("User tidak ditemukan".into()));
    }
    Ok(Json(json!({"message": "User berhasil dihapus"})))
}

#[derive(Deserialize)]
pub struct AssignRoleRequest {
    pub role: Option<String>,
}

/// `POST /api/users/:id/roles`
pub async fn assign_role(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<AssignRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = FieldErrors::new();
    let role: Option<Role> = validation::require(&mut errors, "role", body.role.as_deref())
        .and_then(|raw| validation::parse_enum(&mut errors, "role", raw));
    errors.into_result()?;

    let conn = ctx.lock_db()?;
    let mut found = user::find_user(&conn, id)?
        .ok_or_else(|| ApiError::NotFound("User tidak ditemukan".into()))?;
    if let Some(role) = role {
        found.role = role;
    }
    user::update_user(&conn, &found)?;
    let found = user::find_user(&conn, found.id)?
        .ok_or_else(|| ApiError::NotFound("User tidak ditemukan".into()))?;

    Ok(Json(json!({
        "message": "Role berhasil diperbarui",
        "data": transform_user(&found),
    })))
}
