//! Authentication endpoints: login, register, token refresh, logout,
//! profile self-service and password change.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::types::{
    generate_token, hash_password, hash_token, verify_password, ApiContext, AuthUser, CurrentToken,
};
use crate::db::repository::{token, user};
use crate::models::{Role, TokenKind, User};
use crate::validation::{self, FieldErrors};

const MIN_LOGIN_PASSWORD: usize = 6;
const MIN_PASSWORD: usize = 8;

/// Mint an auth + refresh token pair for `user_id`. Returns the plaintexts;
/// only their hashes are stored.
fn issue_token_pair(conn: &Connection, user_id: i64) -> Result<(String, String), ApiError> {
    let auth_token = generate_token();
    let refresh_token = generate_token();
    token::insert_token(conn, user_id, &hash_token(&auth_token), TokenKind::Auth)?;
    token::insert_token(conn, user_id, &hash_token(&refresh_token), TokenKind::Refresh)?;
    Ok((auth_token, refresh_token))
}

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role.as_str(),
        "email_verified_at": user.email_verified_at.map(|t| t.to_rfc3339()),
        "created_at": user.created_at.to_rfc3339(),
        "updated_at": user.updated_at.to_rfc3339(),
    })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(email) = validation::require(&mut errors, "email", body.email.as_deref()) {
        validation::check_email(&mut errors, "email", email);
    }
    if let Some(password) = validation::require(&mut errors, "password", body.password.as_deref()) {
        validation::check_min_len(&mut errors, "password", password, MIN_LOGIN_PASSWORD);
    }
    errors.into_result()?;

    let email = body.email.as_deref().unwrap_or_default();
    let password = body.password.as_deref().unwrap_or_default();

    let conn = ctx.lock_db()?;
    let found = user::find_user_by_email(&conn, email)?;
    // Unknown email and wrong password are indistinguishable to the client
    let found = found
        .filter(|u| verify_password(password, &u.password_hash))
        .ok_or(ApiError::InvalidCredentials)?;

    let (auth_token, refresh_token) = issue_token_pair(&conn, found.id)?;

    Ok(Json(json!({
        "message": "Login berhasil",
        "user": user_json(&found),
        "token": auth_token,
        "refresh_token": refresh_token,
        "token_type": "Bearer",
    })))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub role: Option<String>,
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let conn = ctx.lock_db()?;

    let mut errors = FieldErrors::new();
    if let Some(name) = validation::require(&mut errors, "name", body.name.as_deref()) {
        validation::check_max_len(&mut errors, "name", name, 255);
    }
    if let Some(email) = validation::require(&mut errors, "email", body.email.as_deref()) {
        validation::check_max_len(&mut errors, "email", email, 255);
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
            name: body.name.clone().unwrap_or_default(),
            email: body.email.clone().unwrap_or_default(),
            password_hash: hash_password(body.password.as_deref().unwrap_or_default())?,
            role: role.unwrap_or(Role::Staff),
            phone: None,
            address: None,
            date_of_birth: None,
            gender: None,
            specialization: None,
            license_number: None,
            // Auto verify, there is no mail flow
            email_verified_at: Some(Utc::now()),
        },
    )?;

    let (auth_token, refresh_token) = issue_token_pair(&conn, created.id)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registrasi berhasil",
            "user": user_json(&created),
            "token": auth_token,
            "refresh_token": refresh_token,
            "token_type": "Bearer",
        })),
    ))
}

/// `POST /api/auth/refresh` — accepts only refresh-kind bearers, consumes
/// the presented token and mints a fresh pair.
pub async fn refresh(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let bearer = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?;

    let presented_hash = hash_token(bearer);
    let conn = ctx.lock_db()?;
    let owner = token::find_user_by_token(&conn, &presented_hash, TokenKind::Refresh)?
        .ok_or(ApiError::Unauthenticated)?;

    token::revoke_token(&conn, &presented_hash)?;
    let (auth_token, refresh_token) = issue_token_pair(&conn, owner.id)?;

    Ok(Json(json!({
        "message": "Token berhasil diperbarui",
        "token": auth_token,
        "refresh_token": refresh_token,
        "token_type": "Bearer",
    })))
}

/// `POST /api/auth/logout` — revokes the presented token only.
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(current): Extension<CurrentToken>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    token::revoke_token(&conn, &current.0)?;
    Ok(Json(json!({"message": "Logout berhasil"})))
}

/// `GET /api/auth/profile`
pub async fn profile(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let found = user::find_user(&conn, auth.id)?.ok_or(ApiError::Unauthenticated)?;
    Ok(Json(json!({"user": user_json(&found)})))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// `PUT /api/auth/profile` — partial update of name and email.
pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let mut found = user::find_user(&conn, auth.id)?.ok_or(ApiError::Unauthenticated)?;

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
    errors.into_result()?;

    if let Some(name) = body.name {
        found.name = name;
    }
    if let Some(email) = body.email {
        found.email = email;
    }
    user::update_user(&conn, &found)?;
    let found = user::find_user(&conn, found.id)?.ok_or(ApiError::Unauthenticated)?;

    Ok(Json(json!({
        "message": "Profil berhasil diperbarui",
        "user": user_json(&found),
    })))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirmation: Option<String>,
}

/// `PUT /api/auth/change-password` — verifies the current password, stores
/// the new hash and revokes every token of the user.
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = FieldErrors::new();
    validation::require(
        &mut errors,
        "current_password",
        body.current_password.as_deref(),
    );
    if let Some(new_password) =
        validation::require(&mut errors, "new_password", body.new_password.as_deref())
    {
        validation::check_min_len(&mut errors, "new_password", new_password, MIN_PASSWORD);
        if body.new_password_confirmation.as_deref() != Some(new_password) {
            errors.add(
                "new_password",
                "The new password field confirmation does not match.",
            );
        }
    }
    errors.into_result()?;

    let conn = ctx.lock_db()?;
    let mut found = user::find_user(&conn, auth.id)?.ok_or(ApiError::Unauthenticated)?;

    let current = body.current_password.as_deref().unwrap_or_default();
    if !verify_password(current, &found.password_hash) {
        return Err(ApiError::WrongPassword);
    }

    found.password_hash = hash_password(body.new_password.as_deref().unwrap_or_default())?;
    user::update_user(&conn, &found)?;
    // Force re-login everywhere
    token::revoke_all_tokens(&conn, found.id)?;

    Ok(Json(json!({
        "message": "Password berhasil diubah. Silakan login kembali."
    })))
}
