//! HTTP router. Routes are nested under `/api/`.
//!
//! Three route groups share one `ApiContext`:
//! public (health + auth entry points), protected (bearer auth) and
//! admin (bearer auth + admin role).
//!
//! Middleware uses `Extension<ApiContext>` (injected as the outermost
//! layer); endpoint handlers use `State<ApiContext>` via `with_state`.

use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the full API router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/refresh", post(endpoints::auth::refresh))
        .with_state(ctx.clone());

    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route(
            "/auth/profile",
            get(endpoints::auth::profile).put(endpoints::auth::update_profile),
        )
        .route("/auth/change-password", put(endpoints::auth::change_password))
        .route("/dashboard/stats", get(endpoints::dashboard::stats))
        .route("/dashboard/activities", get(endpoints::dashboard::activities))
        .route(
            "/dashboard/notifications",
            get(endpoints::dashboard::notifications),
        )
        .route(
            "/pasien",
            get(endpoints::patients::index).post(endpoints::patients::store),
        )
        .route("/pasien/search", get(endpoints::patients::search))
        .route("/pasien/statistics", get(endpoints::patients::statistics))
        .route(
            "/pasien/:id",
            get(endpoints::patients::show)
                .put(endpoints::patients::update)
                .delete(endpoints::patients::destroy),
        )
        .route(
            "/doctor",
            get(endpoints::doctors::index).post(endpoints::doctors::store),
        )
        .route("/doctor/statistics", get(endpoints::doctors::statistics))
        .route(
            "/doctor/:id",
            get(endpoints::doctors::show)
                .put(endpoints::doctors::update)
                .delete(endpoints::doctors::destroy),
        )
        .route(
            "/doctor/:id/schedule",
            get(endpoints::doctors::schedule).post(endpoints::doctors::update_schedule),
        )
        .route("/doctor/:id/patients", get(endpoints::doctors::roster))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so the auth middleware can read it
        .layer(axum::Extension(ctx.clone()));

    let admin = Router::new()
        .route(
            "/users",
            get(endpoints::users::index).post(endpoints::users::store),
        )
        .route(
            "/users/:id",
            put(endpoints::users::update).delete(endpoints::users::destroy),
        )
        .route("/users/:id/roles", post(endpoints::users::assign_role))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::role::require_admin))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", public)
        .nest("/api", protected)
        .nest("/api", admin)
        .fallback(not_found)
}

/// Fallback for unknown routes: a 404 that lists the main entry points.
async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": "API endpoint not found",
            "available_endpoints": {
                "GET /api/health": "Health check",
                "POST /api/auth/login": "User login",
                "POST /api/auth/register": "User registration",
                "GET /api/dashboard/stats": "Dashboard statistics (auth required)",
                "GET /api/pasien": "List patients (auth required)",
                "GET /api/doctor": "List doctors (auth required)",
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::db::open_memory_database;

    fn test_app() -> (Router, ApiContext) {
        let ctx = ApiContext::from_connection(open_memory_database().unwrap());
        (api_router(ctx.clone()), ctx)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Register a user via the API and return (auth_token, refresh_token).
    async fn register(app: &Router, name: &str, email: &str, role: &str) -> (String, String) {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({
                    "name": name,
                    "email": email,
                    "password": "rahasia-123",
                    "password_confirmation": "rahasia-123",
                    "role": role,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        (
            body["token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    fn patient_payload(nama: &str, nomor_identitas: &str) -> Value {
        json!({
            "nama": nama,
            "telepon": "081234567890",
            "alamat": "Jl. Merdeka 1, Jakarta",
            "tanggal_lahir": "1990-05-20",
            "jenis_kelamin": "L",
            "nomor_identitas": nomor_identitas,
            "jenis_identitas": "ktp",
            "kontak_darurat_nama": "Budi",
            "kontak_darurat_telepon": "081298765432",
            "kontak_darurat_hubungan": "Saudara",
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _) = test_app();
        let response = app.oneshot(get_request("/api/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let (app, _) = test_app();
        let response = app.oneshot(get_request("/api/pasien", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Unauthenticated");
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_401() {
        let (app, _) = test_app();
        register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({"email": "andi@klinik.test", "password": "salah-semua"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Email atau password salah");
    }

    #[tokio::test]
    async fn registered_token_grants_access() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(get_request("/api/pasien", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["current_page"], 1);
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn staff_cannot_reach_admin_routes() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Staf", "staf@klinik.test", "staff").await;

        let response = app
            .oneshot(get_request("/api/users", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Forbidden. Insufficient privileges.");
        assert_eq!(body["required_roles"][0], "admin");
        assert_eq!(body["user_role"], "staff");
    }

    #[tokio::test]
    async fn admin_manages_users() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Admin", "admin@klinik.test", "admin").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/users",
                Some(&token),
                json!({
                    "name": "Perawat",
                    "email": "perawat@klinik.test",
                    "password": "rahasia-123",
                    "password_confirmation": "rahasia-123",
                    "role": "nurse",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = response_json(response).await;
        let user_id = created["data"]["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/users/{user_id}/roles"),
                Some(&token),
                json!({"role": "staff"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Role berhasil diperbarui");
        assert_eq!(body["data"]["role"], "staff");

        let response = app
            .oneshot(get_request("/api/users", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn change_password_revokes_existing_tokens() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/auth/change-password",
                Some(&token),
                json!({
                    "current_password": "rahasia-123",
                    "new_password": "rahasia-baru-456",
                    "new_password_confirmation": "rahasia-baru-456",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Old token is gone
        let response = app
            .clone()
            .oneshot(get_request("/api/auth/profile", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // New password logs in
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({"email": "andi@klinik.test", "password": "rahasia-baru-456"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_revokes_only_presented_token() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/logout", Some(&token), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request("/api/auth/profile", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_cannot_authenticate_requests() {
        let (app, _) = test_app();
        let (_, refresh_token) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(get_request("/api/pasien", Some(&refresh_token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_token_cannot_refresh() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(json_request("POST", "/api/auth/refresh", Some(&token), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_consumes_old_token_and_issues_new_pair() {
        let (app, _) = test_app();
        let (_, refresh_token) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/refresh",
                Some(&refresh_token),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Token berhasil diperbarui");
        let new_auth = body["token"].as_str().unwrap().to_string();

        // New auth token works
        let response = app
            .clone()
            .oneshot(get_request("/api/auth/profile", Some(&new_auth)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Presented refresh token was consumed
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/auth/refresh",
                Some(&refresh_token),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn patient_creation_assigns_record_number() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/pasien",
                Some(&token),
                patient_payload("Siti", "3171000000000001"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Pasien berhasil ditambahkan");
        let rm = body["data"]["nomor_rekam_medis"].as_str().unwrap();
        assert!(rm.starts_with("RM"));
        assert!(rm.ends_with("0001"));
        assert_eq!(body["data"]["status"], "aktif");
    }

    #[tokio::test]
    async fn patient_validation_collects_all_fields() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/pasien",
                Some(&token),
                json!({"jenis_kelamin": "X", "email": "not-an-email"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Validation errors");
        assert!(body["errors"]["nama"].is_array());
        assert!(body["errors"]["telepon"].is_array());
        assert!(body["errors"]["jenis_kelamin"].is_array());
        assert!(body["errors"]["email"].is_array());
    }

    #[tokio::test]
    async fn unknown_sort_field_is_ignored() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(get_request(
                "/api/pasien?sort_by=password_hash&sort_order=up",
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn patient_search_requires_two_characters() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .oneshot(get_request("/api/pasien/search?q=a", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = response_json(response).await;
        assert!(body["errors"]["q"].is_array());
    }

    #[tokio::test]
    async fn deleted_patient_is_hidden_from_listing() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pasien",
                Some(&token),
                patient_payload("Siti", "3171000000000001"),
            ))
            .await
            .unwrap();
        let body = response_json(response).await;
        let id = body["data"]["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                &format!("/api/pasien/{id}"),
                Some(&token),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Pasien berhasil dihapus");

        let response = app
            .clone()
            .oneshot(get_request("/api/pasien", Some(&token)))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["total"], 0);

        // Detail view still resolves the archived row
        let response = app
            .oneshot(get_request(&format!("/api/pasien/{id}"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn doctor_with_active_patients_cannot_be_deleted() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        // Create a doctor
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/doctor",
                Some(&token),
                json!({
                    "name": "Dr Sari",
                    "email": "sari@klinik.test",
                    "password": "rahasia-123",
                    "password_confirmation": "rahasia-123",
                    "specialization": "Umum",
                    "license_number": "STR-001",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let doctor_id = response_json(response).await["data"]["id"].as_i64().unwrap();

        // Assign a patient to the doctor
        let mut payload = patient_payload("Siti", "3171000000000001");
        payload["doctor_id"] = json!(doctor_id);
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/pasien", Some(&token), payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let patient_id = response_json(response).await["data"]["id"].as_i64().unwrap();

        // Delete is refused while the patient is assigned
        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                &format!("/api/doctor/{doctor_id}"),
                Some(&token),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // Unassign via an explicit null, then delete succeeds
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/pasien/{patient_id}"),
                Some(&token),
                json!({"doctor_id": null}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert!(body["data"]["doctor"].is_null());

        let response = app
            .oneshot(json_request(
                "DELETE",
                &format!("/api/doctor/{doctor_id}"),
                Some(&token),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Dokter berhasil dihapus");
    }

    #[tokio::test]
    async fn non_doctor_id_is_rejected_for_doctor_routes() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .clone()
            .oneshot(get_request("/api/auth/profile", Some(&token)))
            .await
            .unwrap();
        let user_id = response_json(response).await["user"]["id"].as_i64().unwrap();

        let response = app
            .oneshot(get_request(&format!("/api/doctor/{user_id}"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response_json(response).await;
        assert_eq!(body["message"], "User bukan dokter");
    }

    #[tokio::test]
    async fn dashboard_endpoints_respond() {
        let (app, _) = test_app();
        let (token, _) = register(&app, "Andi", "andi@klinik.test", "staff").await;

        let response = app
            .clone()
            .oneshot(get_request("/api/dashboard/stats", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert!(body["generated_at"].is_string());
        assert_eq!(body["data"]["stats"]["total_staff"], 1);

        let response = app
            .clone()
            .oneshot(get_request("/api/dashboard/activities", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"][0]["type"], "user_registration");

        let response = app
            .oneshot(get_request("/api/dashboard/notifications", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["total"], body["unread_count"]);
    }

    #[tokio::test]
    async fn unknown_route_lists_entry_points() {
        let (app, _) = test_app();
        let response = app
            .oneshot(get_request("/api/nonexistent", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response_json(response).await;
        assert_eq!(body["message"], "API endpoint not found");
        assert_eq!(body["available_endpoints"]["GET /api/health"], "Health check");
    }
}
