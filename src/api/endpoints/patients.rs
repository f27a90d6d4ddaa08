//! Patient CRUD, quick search and statistics.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Paginated};
use crate::db::repository::{patient, user};
use crate::models::{
    BloodType, Gender, IdentityType, MaritalStatus, PageRequest, PatientListFilter, PatientRecord,
    PatientStatus, Religion, SortSpec, DEFAULT_PER_PAGE, PATIENT_DEFAULT_SORT, PATIENT_SORT_FIELDS,
};
use crate::validation::{self, FieldErrors};

const SEARCH_LIMIT: u32 = 20;

/// Distinguishes an absent JSON field (`Ok(None)` via serde default) from an
/// explicit `null` (`Ok(Some(None))`). Partial updates clear nullable columns
/// only when the client sends `null`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Full response shape for a patient, including display labels and
/// derived fields.
pub(crate) fn transform_patient(record: &PatientRecord, today: NaiveDate) -> Value {
    let p = &record.patient;
    json!({
        "id": p.id,
        "nama": p.nama,
        "email": p.email,
        "telepon": p.telepon,
        "alamat": p.alamat,
        "formatted_alamat": p.formatted_alamat(),
        "tanggal_lahir": p.tanggal_lahir.format("%Y-%m-%d").to_string(),
        "umur": p.umur(today),
        "jenis_kelamin": p.jenis_kelamin.as_str(),
        "jenis_kelamin_label": p.jenis_kelamin.label(),
        "nomor_identitas": p.nomor_identitas,
        "jenis_identitas": p.jenis_identitas.as_str(),
        "jenis_identitas_label": p.jenis_identitas.label(),
        "golongan_darah": p.golongan_darah.map(|b| b.as_str()),
        "golongan_darah_label": p.golongan_darah.map(|b| b.label()),
        "alergi": p.alergi,
        "has_allergies": p.has_allergies(),
        "riwayat_penyakit": p.riwayat_penyakit,
        "has_medical_history": p.has_medical_history(),
        "kontak_darurat_nama": p.kontak_darurat_nama,
        "kontak_darurat_telepon": p.kontak_darurat_telepon,
        "kontak_darurat_hubungan": p.kontak_darurat_hubungan,
        "emergency_contact": p.emergency_contact(),
        "pekerjaan": p.pekerjaan,
        "status_pernikahan": p.status_pernikahan.map(|s| s.as_str()),
        "status_pernikahan_label": p.status_pernikahan.map(|s| s.label()),
        "agama": p.agama.map(|a| a.as_str()),
        "agama_label": p.agama.map(|a| a.label()),
        "catatan": p.catatan,
        "status": p.status.as_str(),
        "status_label": p.status.label(),
        "nomor_rekam_medis": p.nomor_rekam_medis,
        "display_name": p.display_name(),
        "doctor": record.doctor,
        "created_at": p.created_at.to_rfc3339(),
        "updated_at": p.updated_at.to_rfc3339(),
    })
}

/// Reject a `doctor_id` that does not reference a user with the doctor role.
fn check_doctor_reference(
    conn: &Connection,
    doctor_id: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(id) = doctor_id {
        let assignee = user::find_user(conn, id)?;
        match assignee {
            Some(u) if u.is_doctor() => {}
            _ => return Err(ApiError::InvalidDoctor),
        }
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub jenis_kelamin: Option<String>,
    pub doctor_id: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `GET /api/pasien`
pub async fn index(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Value>>, ApiError> {
    let filter = PatientListFilter {
        search: non_empty(query.search),
        status: query.status.as_deref().and_then(|s| s.parse().ok()),
        jenis_kelamin: query.jenis_kelamin.as_deref().and_then(|g| g.parse().ok()),
        doctor_id: query.doctor_id,
    };
    let sort = SortSpec::resolve(
        query.sort_by.as_deref(),
        query.sort_order.as_deref(),
        PATIENT_SORT_FIELDS,
        PATIENT_DEFAULT_SORT,
    );
    let page = PageRequest::new(query.page, query.per_page, DEFAULT_PER_PAGE);

    let conn = ctx.lock_db()?;
    let (records, total) = patient::list_patients(&conn, &filter, sort, page)?;

    let today = Utc::now().date_naive();
    let data = records
        .iter()
        .map(|r| transform_patient(r, today))
        .collect();
    Ok(Json(Paginated::new(data, page, total)))
}

#[derive(Deserialize)]
pub struct CreatePatientRequest {
    pub nama: Option<String>,
    pub email: Option<String>,
    pub telepon: Option<String>,
    pub alamat: Option<String>,
    pub tanggal_lahir: Option<String>,
    pub jenis_kelamin: Option<String>,
    pub nomor_identitas: Option<String>,
    pub jenis_identitas: Option<String>,
    pub golongan_darah: Option<String>,
    pub alergi: Option<String>,
    pub riwayat_penyakit: Option<String>,
    pub kontak_darurat_nama: Option<String>,
    pub kontak_darurat_telepon: Option<String>,
    pub kontak_darurat_hubungan: Option<String>,
    pub pekerjaan: Option<String>,
    pub status_pernikahan: Option<String>,
    pub agama: Option<String>,
    pub catatan: Option<String>,
    pub doctor_id: Option<i64>,
}

/// `POST /api/pasien` — validates everything, assigns the record number.
pub async fn store(
    State(ctx): State<ApiContext>,
    Json(body): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut conn = ctx.lock_db()?;
    let today = Utc::now().date_naive();

    let mut errors = FieldErrors::new();
    if let Some(nama) = validation::require(&mut errors, "nama", body.nama.as_deref()) {
        validation::check_max_len(&mut errors, "nama", nama, 255);
    }
    let email = non_empty(body.email.clone());
    if let Some(email) = email.as_deref() {
        if validation::check_email(&mut errors, "email", email)
            && patient::email_exists(&conn, email, None)?
        {
            errors.add("email", "The email has already been taken.");
        }
    }
    if let Some(telepon) = validation::require(&mut errors, "telepon", body.telepon.as_deref()) {
        validation::check_max_len(&mut errors, "telepon", telepon, 20);
    }
    validation::require(&mut errors, "alamat", body.alamat.as_deref());
    let tanggal_lahir =
        validation::require(&mut errors, "tanggal_lahir", body.tanggal_lahir.as_deref())
            .and_then(|raw| validation::parse_date(&mut errors, "tanggal_lahir", raw));
    if let Some(date) = tanggal_lahir {
        validation::check_before_today(&mut errors, "tanggal_lahir", date, today);
    }
    let jenis_kelamin: Option<Gender> =
        validation::require(&mut errors, "jenis_kelamin", body.jenis_kelamin.as_deref())
            .and_then(|raw| validation::parse_enum(&mut errors, "jenis_kelamin", raw));
    if let Some(nomor) = validation::require(
        &mut errors,
        "nomor_identitas",
        body.nomor_identitas.as_deref(),
    ) {
        validation::check_max_len(&mut errors, "nomor_identitas", nomor, 50);
        if patient::nomor_identitas_exists(&conn, nomor, None)? {
            errors.add("nomor_identitas", "The nomor identitas has already been taken.");
        }
    }
    let jenis_identitas: Option<IdentityType> = validation::require(
        &mut errors,
        "jenis_identitas",
        body.jenis_identitas.as_deref(),
    )
    .and_then(|raw| validation::parse_enum(&mut errors, "jenis_identitas", raw));
    let golongan_darah: Option<BloodType> = non_empty(body.golongan_darah.clone())
        .and_then(|raw| validation::parse_enum(&mut errors, "golongan_darah", &raw));
    if let Some(nama) = validation::require(
        &mut errors,
        "kontak_darurat_nama",
        body.kontak_darurat_nama.as_deref(),
    ) {
        validation::check_max_len(&mut errors, "kontak_darurat_nama", nama, 255);
    }
    if let Some(telepon) = validation::require(
        &mut errors,
        "kontak_darurat_telepon",
        body.kontak_darurat_telepon.as_deref(),
    ) {
        validation::check_max_len(&mut errors, "kontak_darurat_telepon", telepon, 20);
    }
    if let Some(hubungan) = validation::require(
        &mut errors,
        "kontak_darurat_hubungan",
        body.kontak_darurat_hubungan.as_deref(),
    ) {
        validation::check_max_len(&mut errors, "kontak_darurat_hubungan", hubungan, 100);
    }
    if let Some(pekerjaan) = non_empty(body.pekerjaan.clone()).as_deref() {
        validation::check_max_len(&mut errors, "pekerjaan", pekerjaan, 255);
    }
    let status_pernikahan: Option<MaritalStatus> = non_empty(body.status_pernikahan.clone())
        .and_then(|raw| validation::parse_enum(&mut errors, "status_pernikahan", &raw));
    let agama: Option<Religion> = non_empty(body.agama.clone())
        .and_then(|raw| validation::parse_enum(&mut errors, "agama", &raw));
    if let Some(id) = body.doctor_id {
        if user::find_user(&conn, id)?.is_none() {
            errors.add("doctor_id", "The selected doctor id is invalid.");
        }
    }
    errors.into_result()?;

    check_doctor_reference(&conn, body.doctor_id)?;

    let record = patient::create_patient(
        &mut conn,
        &patient::NewPatient {
            nama: body.nama.unwrap_or_default(),
            email,
            telepon: body.telepon.unwrap_or_default(),
            alamat: body.alamat.unwrap_or_default(),
            tanggal_lahir: tanggal_lahir.unwrap_or_default(),
            jenis_kelamin: jenis_kelamin.unwrap_or(Gender::Male),
            nomor_identitas: body.nomor_identitas.unwrap_or_default(),
            jenis_identitas: jenis_identitas.unwrap_or(IdentityType::Ktp),
            golongan_darah,
            alergi: non_empty(body.alergi),
            riwayat_penyakit: non_empty(body.riwayat_penyakit),
            kontak_darurat_nama: body.kontak_darurat_nama.unwrap_or_default(),
            kontak_darurat_telepon: body.kontak_darurat_telepon.unwrap_or_default(),
            kontak_darurat_hubungan: body.kontak_darurat_hubungan.unwrap_or_default(),
            pekerjaan: non_empty(body.pekerjaan),
            status_pernikahan,
            agama,
            catatan: non_empty(body.catatan),
            doctor_id: body.doctor_id,
        },
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Pasien berhasil ditambahkan",
            "data": transform_patient(&record, today),
        })),
    ))
}

/// `GET /api/pasien/:id` — returns soft-deleted rows too.
pub async fn show(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let record = patient::find_patient(&conn, id)?
        .ok_or_else(|| ApiError::NotFound("Pasien tidak ditemukan".into()))?;
    Ok(Json(json!({
        "data": transform_patient(&record, Utc::now().date_naive())
    })))
}

#[derive(Deserialize)]
pub struct UpdatePatientRequest {
    pub nama: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    pub telepon: Option<String>,
    pub alamat: Option<String>,
    pub tanggal_lahir: Option<String>,
    pub jenis_kelamin: Option<String>,
    pub nomor_identitas: Option<String>,
    pub jenis_identitas: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub golongan_darah: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub alergi: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub riwayat_penyakit: Option<Option<String>>,
    pub kontak_darurat_nama: Option<String>,
    pub kontak_darurat_telepon: Option<String>,
    pub kontak_darurat_hubungan: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub pekerjaan: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub status_pernikahan: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub agama: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub catatan: Option<Option<String>>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub doctor_id: Option<Option<i64>>,
}

/// `PUT /api/pasien/:id` — partial update. The record number is never
/// client-writable.
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let record = patient::find_patient(&conn, id)?
        .ok_or_else(|| ApiError::NotFound("Pasien tidak ditemukan".into()))?;
    let mut p = record.patient;
    let today = Utc::now().date_naive();

    let mut errors = FieldErrors::new();
    if let Some(nama) = &body.nama {
        if nama.is_empty() {
            errors.add("nama", "The nama field is required.");
        } else {
            validation::check_max_len(&mut errors, "nama", nama, 255);
        }
    }
    if let Some(email) = &body.email {
        if let Some(email) = email.as_deref().filter(|e| !e.is_empty()) {
            if validation::check_email(&mut errors, "email", email)
                && patient::email_exists(&conn, email, Some(p.id))?
            {
                errors.add("email", "The email has already been taken.");
            }
        }
    }
    if let Some(telepon) = &body.telepon {
        if telepon.is_empty() {
            errors.add("telepon", "The telepon field is required.");
        } else {
            validation::check_max_len(&mut errors, "telepon", telepon, 20);
        }
    }
    if body.alamat.as_deref() == Some("") {
        errors.add("alamat", "The alamat field is required.");
    }
    let tanggal_lahir = body
        .tanggal_lahir
        .as_deref()
        .and_then(|raw| validation::parse_date(&mut errors, "tanggal_lahir", raw));
    if let Some(date) = tanggal_lahir {
        validation::check_before_today(&mut errors, "tanggal_lahir", date, today);
    }
    let jenis_kelamin: Option<Gender> = body
        .jenis_kelamin
        .as_deref()
        .and_then(|raw| validation::parse_enum(&mut errors, "jenis_kelamin", raw));
    if let Some(nomor) = &body.nomor_identitas {
        if nomor.is_empty() {
            errors.add("nomor_identitas", "The nomor identitas field is required.");
        } else {
            validation::check_max_len(&mut errors, "nomor_identitas", nomor, 50);
            if patient::nomor_identitas_exists(&conn, nomor, Some(p.id))? {
                errors.add("nomor_identitas", "The nomor identitas has already been taken.");
            }
        }
    }
    let jenis_identitas: Option<IdentityType> = body
        .jenis_identitas
        .as_deref()
        .and_then(|raw| validation::parse_enum(&mut errors, "jenis_identitas", raw));
    let golongan_darah: Option<Option<BloodType>> = match &body.golongan_darah {
        Some(Some(raw)) if !raw.is_empty() => validation::parse_enum(&mut errors, "golongan_darah", raw).map(Some),
        Some(_) => Some(None),
        None => None,
    };
    let status_pernikahan: Option<Option<MaritalStatus>> = match &body.status_pernikahan {
        Some(Some(raw)) if !raw.is_empty() => {
            validation::parse_enum(&mut errors, "status_pernikahan", raw).map(Some)
        }
        Some(_) => Some(None),
        None => None,
    };
    let agama: Option<Option<Religion>> = match &body.agama {
        Some(Some(raw)) if !raw.is_empty() => validation::parse_enum(&mut errors, "agama", raw).map(Some),
        Some(_) => Some(None),
        None => None,
    };
    let status: Option<PatientStatus> = body
        .status
        .as_deref()
        .and_then(|raw| validation::parse_enum(&mut errors, "status", raw));
    if let Some(Some(doctor_id)) = body.doctor_id {
        if user::find_user(&conn, doctor_id)?.is_none() {
            errors.add("doctor_id", "The selected doctor id is invalid.");
        }
    }
    errors.into_result()?;

    check_doctor_reference(&conn, body.doctor_id.flatten())?;

    if let Some(nama) = body.nama {
        p.nama = nama;
    }
    if let Some(email) = body.email {
        p.email = email.filter(|e| !e.is_empty());
    }
    if let Some(telepon) = body.telepon {
        p.telepon = telepon;
    }
    if let Some(alamat) = body.alamat {
        p.alamat = alamat;
    }
    if let Some(date) = tanggal_lahir {
        p.tanggal_lahir = date;
    }
    if let Some(gender) = jenis_kelamin {
        p.jenis_kelamin = gender;
    }
    if let Some(nomor) = body.nomor_identitas {
        p.nomor_identitas = nomor;
    }
    if let Some(identitas) = jenis_identitas {
        p.jenis_identitas = identitas;
    }
    if let Some(blood) = golongan_darah {
        p.golongan_darah = blood;
    }
    if let Some(alergi) = body.alergi {
        p.alergi = alergi.filter(|a| !a.is_empty());
    }
    if let Some(riwayat) = body.riwayat_penyakit {
        p.riwayat_penyakit = riwayat.filter(|r| !r.is_empty());
    }
    if let Some(nama) = body.kontak_darurat_nama {
        p.kontak_darurat_nama = nama;
    }
    if let Some(telepon) = body.kontak_darurat_telepon {
        p.kontak_darurat_telepon = telepon;
    }
    if let Some(hubungan) = body.kontak_darurat_hubungan {
        p.kontak_darurat_hubungan = hubungan;
    }
    if let Some(pekerjaan) = body.pekerjaan {
        p.pekerjaan = pekerjaan.filter(|v| !v.is_empty());
    }
    if let Some(pernikahan) = status_pernikahan {
        p.status_pernikahan = pernikahan;
    }
    if let Some(agama) = agama {
        p.agama = agama;
    }
    if let Some(catatan) = body.catatan {
        p.catatan = catatan.filter(|c| !c.is_empty());
    }
    if let Some(status) = status {
        p.status = status;
    }
    if let Some(doctor_id) = body.doctor_id {
        p.doctor_id = doctor_id;
    }

    patient::update_patient(&conn, &p)?;
    let record = patient::find_patient(&conn, p.id)?
        .ok_or_else(|| ApiError::NotFound("Pasien tidak ditemukan".into()))?;

    Ok(Json(json!({
        "message": "Pasien berhasil diperbarui",
        "data": transform_patient(&record, today),
    })))
}

/// `DELETE /api/pasien/:id` — soft delete.
pub async fn destroy(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    if !patient::soft_delete_patient(&conn, id)? {
        return Err(ApiError::NotFound("Pasien tidak ditemukan".into()));
    }
    Ok(Json(json!({"message": "Pasien berhasil dihapus"})))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// `GET /api/pasien/search?q=` — compact quick-search, max 20 rows.
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(q) = validation::require(&mut errors, "q", query.q.as_deref()) {
        validation::check_min_len(&mut errors, "q", q, 2);
    }
    errors.into_result()?;

    let conn = ctx.lock_db()?;
    let records = patient::search_patients(&conn, query.q.as_deref().unwrap_or_default(), SEARCH_LIMIT)?;

    let today = Utc::now().date_naive();
    let data: Vec<Value> = records
        .iter()
        .map(|record| {
            let p = &record.patient;
            json!({
                "id": p.id,
                "nama": p.nama,
                "email": p.email,
                "telepon": p.telepon,
                "nomor_rekam_medis": p.nomor_rekam_medis,
                "display_name": p.display_name(),
                "jenis_kelamin_label": p.jenis_kelamin.label(),
                "umur": p.umur(today),
                "doctor": record.doctor,
            })
        })
        .collect();

    Ok(Json(json!({"data": data})))
}

/// `GET /api/pasien/statistics` — counts over all non-deleted patients.
pub async fn statistics(State(ctx): State<ApiContext>) -> Result<Json<Value>, ApiError> {
    let conn = ctx.lock_db()?;
    let today = Utc::now().date_naive();

    let age_groups = patient::age_group_counts(&conn, false)?;
    let blood_types: serde_json::Map<String, Value> = patient::blood_type_distribution(&conn, false)?
        .into_iter()
        .map(|(blood_type, count)| (blood_type, json!(count)))
        .collect();

    Ok(Json(json!({
        "data": {
            "total_patients": patient::count_patients(&conn)?,
            "active_patients": patient::count_by_status(&conn, PatientStatus::Active)?,
            "inactive_patients": patient::count_by_status(&conn, PatientStatus::Inactive)?,
            "male_patients": patient::count_by_gender(&conn, Gender::Male)?,
            "female_patients": patient::count_by_gender(&conn, Gender::Female)?,
            "patients_this_month":
                patient::count_created_in_month(&conn, today.year(), today.month())?,
            "patients_this_year": patient::count_created_in_year(&conn, today.year())?,
            "age_groups": age_groups,
            "blood_type_distribution": blood_types,
        }
    })))
}
