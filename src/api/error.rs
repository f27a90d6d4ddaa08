//! API error types with structured JSON responses.
//!
//! Every error renders as a `{message, ...}` body. Validation failures carry
//! the per-field `errors` map; forbidden responses carry role diagnostics.
//! Internal errors are logged server-side and surfaced opaquely.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::authorization::AccessDenied;
use crate::db::DatabaseError;
use crate::validation::FieldErrors;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation errors")]
    Validation(FieldErrors),
    #[error("Email atau password salah")]
    InvalidCredentials,
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Forbidden. Insufficient privileges.")]
    Forbidden {
        required_roles: Vec<&'static str>,
        user_role: &'static str,
    },
    #[error("Password lama tidak sesuai")]
    WrongPassword,
    #[error("Invalid doctor selection")]
    InvalidDoctor,
    #[error("Doctor still has {0} active patients")]
    HasActivePatients(i64),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"message": "Validation errors", "errors": errors}),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({"message": "Email atau password salah"}),
            ),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({"message": "Unauthenticated"}),
            ),
            ApiError::Forbidden {
                required_roles,
                user_role,
            } => (
                StatusCode::FORBIDDEN,
                json!({
                    "message": "Forbidden. Insufficient privileges.",
                    "required_roles": required_roles,
                    "user_role": user_role,
                }),
            ),
            ApiError::WrongPassword => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"message": "Password lama tidak sesuai"}),
            ),
            ApiError::InvalidDoctor => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"message": "Invalid doctor selection"}),
            ),
            ApiError::HasActivePatients(count) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "message": format!(
                        "Tidak dapat menghapus dokter yang memiliki {count} pasien aktif. \
                         Pindahkan pasien terlebih dahulu."
                    ),
                }),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({"message": message})),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                // Detail stays in the server log only
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"message": "Terjadi kesalahan pada server"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<AccessDenied> for ApiError {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            AccessDenied::Unauthenticated => ApiError::Unauthenticated,
            AccessDenied::Forbidden {
                required_roles,
                user_role,
            } => ApiError::Forbidden {
                required_roles,
                user_role,
            },
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
