//! Doctor management: CRUD over doctor-role users, patient rosters,
//! workload statistics and the consultation schedule.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::endpoints::patients::double_option;
use crate::api::error::ApiError;
use crate::api::types::{hash_password, ApiContext, Paginated};
use crate::db::repository::{patient, token, user};
use crate::models::{
    DoctorListFilter, Gender, PageRequest, Role, SortSpec, User, DEFAULT_PER_PAGE,
    DOCTOR_DEFAULT_SORT, DOCTOR_SORT_FIELDS,
};
use crate::validation::{self, FieldErrors};

const MIN_PASSWORD: usize = 8;
const ROSTER_PER_PAGE: u32 = 20;

fn transform_doctor(doctor: &User, patient_count: i64) -> Value {
    json!({
        "id": doctor.id,
        "name": doctor.name,
        "email": doctor.email,
        "phone": doctor.phone,
        "address": doctor.address,
        "date_of_birth": doctor.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
        "gender": doctor.gender.map(|g| g.as_str()),
        "specialization": doctor.specialization,
        "license_number": doctor.license_number,
        "role": doctor.role.as_str(),
        "role_label": doctor.role.label(),
        "email_verified_at": doctor.email_verified_at.map(|t| t.to_rfc3339()),
        "patient_count": patient_count,
        "created_at": doctor.created_at.to_rfc3339(),
        "updated_at": doctor.updated_at.to_rfc3339(),
    })
}

/// Bucket a patient count into the reporting scale.
fn workload_level(patient_count: i64) -> &'static str {
    match patient_count {
        0 => "none",
        1..=10 => "light",
        11..=30 => "moderate",
        31..=50 => "heavy",
        _ => "overloaded",
    }
}

fn find_doctor(conn: &Connection, id: i64) -> Result<User, ApiError> {
    let found = user::find_user(conn, id)?;
    match found {
        Some(u) if u.is_doctor() => Ok(u),
        _ => Err(ApiError::NotFound("User bukan dokter".into())),
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub specialization: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `GET /api/doctor`
pub async fn index(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Value>>, ApiError> {
    let filter = DoctorListFilter {
        search: query.search.filter(|s| !s.is_empty()),
        specialization: query.specialization.filter(|s| !s.is_empty()),
    };
    let sort = SortSpec::resolve(
        query.sort_by.as_deref(),
        query.sort_order.as_deref(),
        DOCTOR_SORT_FIELDS,
        DOCTOR_DEFAULT_SORT,
    );
    let page = PageRequest::new(query.page, query.per_page, DEFAULT_PER_PAGE);

    let conn = ctx.lock_db()?;
    let (doctors, total) = user::list_doctors(&conn, &filter, sort, page)?;

    let data = doctors
        .iter()
        .map(|(doctor, count)| transform_doctor(doctor, *count))
        .collect();
    Ok(Json(Paginated::new(data, page, total)))
}

#[derive(Deserialize)]
pub struct CreateDoctorRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
}

/// `POST /api/doctor` — always creates a doctor-role user.
pub async fn store(
    State(ctx): State<ApiContext>,
    Json(body): Json<CreateDoctorRequest>,
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
    if let Some(specialization) =
        validation::require(&mut errors, "specialization", body.specialization.as_deref())
    {
        validation::check_max_len(&mut errors, "specialization", specialization, 255);
    }
    if let Some(license) = validation::require(
        &mut errors,
        "license_number",
        body.license_number.as_deref(),
    ) {
        validation::check_max_len(&mut errors, "license_number", license, 50);
        if user::license_number_exists(&conn, license, None)? {
            errors.add("license_number", "The license number has already been taken.");
        }
    }
    let date_of_birth = body
        .date_of_birth
        .as_deref()
        .filter(|d| !d.is_empty())
        .and_then(|raw| validation::parse_date(&mut errors, "date_of_birth", raw));
    let gender: Option<Gender> = body
        .gender
        .as_deref()
        .filter(|g| !g.is_empty())
        .and_then(|raw| validation::parse_enum(&mut errors, "gender", raw));
    errors.into_result()?;

    let created = user::insert_user(
        &conn,
        &user::NewUser {
            name: body.name.unwrap_or_default(),
            email: body.email.unwrap_or_default(),
            password_hash: hash_password(body.password.as_deref().unwrap_or_default())?,
            role: Role::Doctor,
            phone: body.phone.filter(|p| !p.is_empty()),
            address: body.address.filter(|a| !a.is_empty()),
            date_of_birth,
            gender,
            specialization: body.specialization,
            license_number: body.license_number,
            email_verified_at: Some(Utc::now()),
        },
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Dokter berhasil ditambahkan",
            "data": transform_doctor(&created, 0),
        })),
    ))
}

/// `GET /api/doctor/:id` — full profile plus the active patient roster.
pub async fn show(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let doctor = find_doctor(&conn, id)?;
    let patient_count = user::active_patient_count(&conn, doctor.id)?;

    let today = Utc::now().date_naive();
    let patients: Vec<Value> = patient::all_active_patients_of_doctor(&conn, doctor.id)?
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "nama": p.nama,
                "nomor_rekam_medis": p.nomor_rekam_medis,
                "telepon": p.telepon,
                "jenis_kelamin_label": p.jenis_kelamin.label(),
                "umur": p.umur(today),
                "status_label": p.status.label(),
            })
        })
        .collect();

    let mut data = transform_doctor(&doctor, patient_count);
    data["patients"] = json!(patients);
    Ok(Json(json!({"data": data})))
}

#[derive(Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub gender: Option<Option<String>>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
}

/// `PUT /api/doctor/:id` — partial update.
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let mut doctor = find_doctor(&conn, id)?;

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
            && user::email_exists(&conn, email, Some(doctor.id))?
        {
            errors.add("email", "The email has already been taken.");
        }
    }
    if let Some(specialization) = &body.specialization {
        if specialization.is_empty() {
            errors.add("specialization", "The specialization field is required.");
        } else {
            validation::check_max_len(&mut errors, "specialization", specialization, 255);
        }
    }
    if let Some(license) = &body.license_number {
        if license.is_empty() {
            errors.add("license_number", "The license number field is required.");
        } else {
            validation::check_max_len(&mut errors, "license_number", license, 50);
            if user::license_number_exists(&conn, license, Some(doctor.id))? {
                errors.add("license_number", "The license number has already been taken.");
            }
        }
    }
    let date_of_birth = match &body.date_of_birth {
        Some(Some(raw)) if !raw.is_empty() => {
            validation::parse_date(&mut errors, "date_of_birth", raw).map(Some)
        }
        Some(_) => Some(None),
        None => None,
    };
    let gender: Option<Option<Gender>> = match &body.gender {
        Some(Some(raw)) if !raw.is_empty() => {
            validation::parse_enum(&mut errors, "gender", raw).map(Some)
        }
        Some(_) => Some(None),
        None => None,
    };
    errors.into_result()?;

    if let Some(name) = body.name {
        doctor.name = name;
    }
    if let Some(email) = body.email {
        doctor.email = email;
    }
    if let Some(phone) = body.phone {
        doctor.phone = phone.filter(|p| !p.is_empty());
    }
    if let Some(address) = body.address {
        doctor.address = address.filter(|a| !a.is_empty());
    }
    if let Some(date) = date_of_birth {
        doctor.date_of_birth = date;
    }
    if let Some(gender) = gender {
        doctor.gender = gender;
    }
    if let Some(specialization) = body.specialization {
        doctor.specialization = Some(specialization);
    }
    if let Some(license) = body.license_number {
        doctor.license_number = Some(license);
    }
    user::update_user(&conn, &doctor)?;

    let doctor = find_doctor(&conn, doctor.id)?;
    let patient_count = user::active_patient_count(&conn, doctor.id)?;
    Ok(Json(json!({
        "message": "Dokter berhasil diperbarui",
        "data": transform_doctor(&doctor, patient_count),
    })))
}

/// `DELETE /api/doctor/:id` — refused while active patients are assigned.
pub async fn destroy(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let doctor = find_doctor(&conn, id)?;

    let assigned = user::active_patient_count(&conn, doctor.id)?;
    if assigned > 0 {
        return Err(ApiError::HasActivePatients(assigned));
    }

    token::revoke_all_tokens(&conn, doctor.id)?;
    user::delete_user(&conn, doctor.id)?;
    Ok(Json(json!({"message": "Dokter berhasil dihapus"})))
}

#[derive(Deserialize)]
pub struct RosterQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `GET /api/doctor/:id/patients` — paginated active roster.
pub async fn roster(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Query(query): Query<RosterQuery>,
) -> Result<Json<Paginated<Value>>, ApiError> {
    let conn = ctx.lock_db()?;
    let doctor = find_doctor(&conn, id)?;

    let page = PageRequest::new(query.page, query.per_page, ROSTER_PER_PAGE);
    let (patients, total) = patient::doctor_patients(&conn, doctor.id, page)?;

    let today = Utc::now().date_naive();
    let data = patients
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "nama": p.nama,
                "nomor_rekam_medis": p.nomor_rekam_medis,
                "telepon": p.telepon,
                "jenis_kelamin_label": p.jenis_kelamin.label(),
                "umur": p.umur(today),
                "status_label": p.status.label(),
                "has_allergies": p.has_allergies(),
                "has_medical_history": p.has_medical_history(),
            })
        })
        .collect();
    Ok(Json(Paginated::new(data, page, total)))
}

/// `GET /api/doctor/statistics`
pub async fn statistics(State(ctx): State<ApiContext>) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;

    let total_doctors = user::count_by_role(&conn, Role::Doctor)?;
    let with_patients = user::doctors_with_patients(&conn)?;
    let assigned_active = patient::assigned_active_count(&conn)?;
    let average = if total_doctors > 0 {
        (assigned_active as f64 / total_doctors as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let workload: Vec<Value> = user::doctor_workloads(&conn)?
        .iter()
        .map(|(doctor, count)| {
            json!({
                "id": doctor.id,
                "name": doctor.name,
                "specialization": doctor.specialization,
                "patient_count": count,
                "workload_level": workload_level(*count),
            })
        })
        .collect();

    let specializations: Vec<Value> = user::specialization_distribution(&conn)?
        .into_iter()
        .map(|(specialization, count)| json!({"specialization": specialization, "count": count}))
        .collect();

    Ok(Json(json!({
        "data": {
            "total_doctors": total_doctors,
            "doctors_with_patients": with_patients,
            "doctors_without_patients": total_doctors - with_patients,
            "average_patients_per_doctor": average,
            "workload_distribution": workload,
            "specialization_distribution": specializations,
        }
    })))
}

/// `GET /api/doctor/:id/schedule` — the schedule itself is not persisted
/// yet, only the default template is served.
pub async fn schedule(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let doctor = find_doctor(&conn, id)?;

    let workday = |start: &str, end: &str| {
        json!({"start": start, "end": end, "available": true})
    };
    Ok(Json(json!({
        "data": {
            "doctor_id": doctor.id,
            "doctor_name": doctor.name,
            "weekly_schedule": {
                "monday": workday("08:00", "17:00"),
                "tuesday": workday("08:00", "17:00"),
                "wednesday": workday("08:00", "17:00"),
                "thursday": workday("08:00", "17:00"),
                "friday": workday("08:00", "17:00"),
                "saturday": workday("08:00", "14:00"),
                "sunday": {"start": null, "end": null, "available": false},
            },
            "break_time": {"start": "12:00", "end": "13:00"},
            "consultation_duration": 30,
            "max_patients_per_day": 20,
        }
    })))
}

#[derive(Deserialize)]
pub struct DaySchedule {
    pub start: Option<String>,
    pub end: Option<String>,
    pub available: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub weekly_schedule: Option<std::collections::BTreeMap<String, DaySchedule>>,
    pub consultation_duration: Option<i64>,
    pub max_patients_per_day: Option<i64>,
}

fn is_valid_clock(value: &str) -> bool {
    NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}

/// `POST /api/doctor/:id/schedule` — validates the payload and acknowledges.
pub async fn update_schedule(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let doctor = find_doctor(&conn, id)?;

    let mut errors = FieldErrors::new();
    match &body.weekly_schedule {
        None => errors.add("weekly_schedule", "The weekly schedule field is required."),
        Some(schedule) => {
            for (day, entry) in schedule {
                if entry.available.is_none() {
                    errors.add(
                        "weekly_schedule",
                        format!("The {day} availability flag is required."),
                    );
                }
                for time in [entry.start.as_deref(), entry.end.as_deref()]
                    .into_iter()
                    .flatten()
                {
                    if !is_valid_clock(time) {
                        errors.add(
                            "weekly_schedule",
                            format!("The {day} time must match the H:i format."),
                        );
                    }
                }
            }
        }
    }
    if let Some(duration) = body.consultation_duration {
        if !(15..=120).contains(&duration) {
            errors.add(
                "consultation_duration",
                "The consultation duration must be between 15 and 120.",
            );
        }
    }
    if let Some(max) = body.max_patients_per_day {
        if !(1..=100).contains(&max) {
            errors.add(
                "max_patients_per_day",
                "The max patients per day must be between 1 and 100.",
            );
        }
    }
    errors.into_result()?;

    Ok(Json(json!({
        "message": "Jadwal dokter berhasil diperbarui",
        "data": {
            "doctor_id": doctor.id,
            "updated_at": Utc::now().to_rfc3339(),
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_levels_match_boundaries() {
        assert_eq!(workload_level(0), "none");
        assert_eq!(workload_level(1), "light");
        assert_eq!(workload_level(10), "light");
        assert_eq!(workload_level(11), "moderate");
        assert_eq!(workload_level(30), "moderate");
        assert_eq!(workload_level(50), "heavy");
        assert_eq!(workload_level(51), "overloaded");
    }

    #[test]
    fn clock_format_accepts_only_hours_and_minutes() {
        assert!(is_valid_clock("08:00"));
        assert!(is_valid_clock("23:59"));
        assert!(!is_valid_clock("8am"));
        assert!(!is_valid_clock("25:00"));
    }
}
