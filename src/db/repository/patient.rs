use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use crate::db::DatabaseError;
use crate::models::{
    BloodType, DoctorRef, Gender, IdentityType, MaritalStatus, PageRequest, Patient,
    PatientListFilter, PatientRecord, PatientStatus, Religion, SortSpec,
};

use super::{parse_column, parse_column_opt};

const PATIENT_COLUMNS: &str = "p.id, p.nama, p.email, p.telepon, p.alamat, p.tanggal_lahir, \
     p.jenis_kelamin, p.nomor_identitas, p.jenis_identitas, p.golongan_darah, \
     p.alergi, p.riwayat_penyakit, p.kontak_darurat_nama, p.kontak_darurat_telepon, \
     p.kontak_darurat_hubungan, p.pekerjaan, p.status_pernikahan, p.agama, \
     p.catatan, p.doctor_id, p.status, p.nomor_rekam_medis, \
     p.created_at, p.updated_at, p.deleted_at";

/// Whole-years age of a row, computed against the database clock.
/// Comparison of the '%m-%d' strings yields 0/1, handling not-yet-birthday.
const AGE_EXPR: &str = "(CAST(strftime('%Y','now') AS INTEGER) \
     - CAST(strftime('%Y', p.tanggal_lahir) AS INTEGER) \
     - (strftime('%m-%d','now') < strftime('%m-%d', p.tanggal_lahir)))";

/// Fields accepted at creation time. The record number, status default and
/// timestamps are assigned by `create_patient`.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub nama: String,
    pub email: Option<String>,
    pub telepon: String,
    pub alamat: String,
    pub tanggal_lahir: NaiveDate,
    pub jenis_kelamin: Gender,
    pub nomor_identitas: String,
    pub jenis_identitas: IdentityType,
    pub golongan_darah: Option<BloodType>,
    pub alergi: Option<String>,
    pub riwayat_penyakit: Option<String>,
    pub kontak_darurat_nama: String,
    pub kontak_darurat_telepon: String,
    pub kontak_darurat_hubungan: String,
    pub pekerjaan: Option<String>,
    pub status_pernikahan: Option<MaritalStatus>,
    pub agama: Option<Religion>,
    pub catatan: Option<String>,
    pub doctor_id: Option<i64>,
}

/// Age-bucket counts for the dashboard histogram.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AgeGroups {
    pub anak: i64,
    pub dewasa_muda: i64,
    pub dewasa: i64,
    pub lansia: i64,
}

fn patient_from_row(row: &Row) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        nama: row.get(1)?,
        email: row.get(2)?,
        telepon: row.get(3)?,
        alamat: row.get(4)?,
        tanggal_lahir: row.get(5)?,
        jenis_kelamin: parse_column(6, row.get::<_, String>(6)?)?,
        nomor_identitas: row.get(7)?,
        jenis_identitas: parse_column(8, row.get::<_, String>(8)?)?,
        golongan_darah: parse_column_opt(9, row.get::<_, Option<String>>(9)?)?,
        alergi: row.get(10)?,
        riwayat_penyakit: row.get(11)?,
        kontak_darurat_nama: row.get(12)?,
        kontak_darurat_telepon: row.get(13)?,
        kontak_darurat_hubungan: row.get(14)?,
        pekerjaan: row.get(15)?,
        status_pernikahan: parse_column_opt(16, row.get::<_, Option<String>>(16)?)?,
        agama: parse_column_opt(17, row.get::<_, Option<String>>(17)?)?,
        catatan: row.get(18)?,
        doctor_id: row.get(19)?,
        status: parse_column(20, row.get::<_, String>(20)?)?,
        nomor_rekam_medis: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
        deleted_at: row.get(24)?,
    })
}

/// Row mapper for queries that append `d.name` (column 25) via the
/// doctor LEFT JOIN.
fn record_from_row(row: &Row) -> rusqlite::Result<PatientRecord> {
    let patient = patient_from_row(row)?;
    let doctor_name: Option<String> = row.get(25)?;
    let doctor = match (patient.doctor_id, doctor_name) {
        (Some(id), Some(name)) => Some(DoctorRef { id, name }),
        _ => None,
    };
    Ok(PatientRecord { patient, doctor })
}

/// Next `RM{yyyy}{mm}{seq:04}` for the month containing `today`.
///
/// Must run inside the same transaction as the insert that uses it; the
/// IMMEDIATE transaction in `create_patient` serializes concurrent creates
/// so the read-then-increment cannot hand out duplicates.
pub fn next_medical_record_number(
    conn: &Connection,
    today: NaiveDate,
) -> Result<String, DatabaseError> {
    let prefix = format!("RM{:04}{:02}", today.year(), today.month());
    let last: Option<String> = conn
        .query_row(
            "SELECT nomor_rekam_medis FROM pasiens \
             WHERE nomor_rekam_medis LIKE ?1 \
             ORDER BY nomor_rekam_medis DESC LIMIT 1",
            params![format!("{prefix}%")],
            |row| row.get(0),
        )
        .optional()?;

    let sequence = last
        .and_then(|number| {
            number
                .get(number.len().saturating_sub(4)..)
                .and_then(|tail| tail.parse::<u32>().ok())
        })
        .map_or(1, |seq| seq + 1);

    Ok(format!("{prefix}{sequence:04}"))
}

/// Insert a new patient, assigning the record number atomically.
pub fn create_patient(
    conn: &mut Connection,
    new: &NewPatient,
) -> Result<PatientRecord, DatabaseError> {
    let now = Utc::now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let nomor_rekam_medis = next_medical_record_number(&tx, now.date_naive())?;
    tx.execute(
        "INSERT INTO pasiens (nama, email, telepon, alamat, tanggal_lahir, \
         jenis_kelamin, nomor_identitas, jenis_identitas, golongan_darah, \
         alergi, riwayat_penyakit, kontak_darurat_nama, kontak_darurat_telepon, \
         kontak_darurat_hubungan, pekerjaan, status_pernikahan, agama, catatan, \
         doctor_id, status, nomor_rekam_medis, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                 ?15, ?16, ?17, ?18, ?19, 'aktif', ?20, ?21, ?22)",
        params![
            new.nama,
            new.email,
            new.telepon,
            new.alamat,
            new.tanggal_lahir,
            new.jenis_kelamin.as_str(),
            new.nomor_identitas,
            new.jenis_identitas.as_str(),
            new.golongan_darah.map(|b| b.as_str()),
            new.alergi,
            new.riwayat_penyakit,
            new.kontak_darurat_nama,
            new.kontak_darurat_telepon,
            new.kontak_darurat_hubungan,
            new.pekerjaan,
            new.status_pernikahan.map(|s| s.as_str()),
            new.agama.map(|a| a.as_str()),
            new.catatan,
            new.doctor_id,
            nomor_rekam_medis,
            now,
            now,
        ],
    )?;

    let id = tx.last_insert_rowid();
    tx.commit()?;

    find_patient(conn, id)?.ok_or(DatabaseError::NotFound {
        entity_type: "pasien".into(),
        id: id.to_string(),
    })
}

/// Direct id lookup. Deliberately returns soft-deleted rows too.
pub fn find_patient(conn: &Connection, id: i64) -> Result<Option<PatientRecord>, DatabaseError> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {PATIENT_COLUMNS}, d.name FROM pasiens p \
                 LEFT JOIN users d ON d.id = p.doctor_id \
                 WHERE p.id = ?1"
            ),
            params![id],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Persist every client-mutable column. `nomor_rekam_medis`, `created_at`
/// and `deleted_at` are intentionally not writable here.
pub fn update_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE pasiens SET nama = ?1, email = ?2, telepon = ?3, alamat = ?4, \
         tanggal_lahir = ?5, jenis_kelamin = ?6, nomor_identitas = ?7, \
         jenis_identitas = ?8, golongan_darah = ?9, alergi = ?10, \
         riwayat_penyakit = ?11, kontak_darurat_nama = ?12, \
         kontak_darurat_telepon = ?13, kontak_darurat_hubungan = ?14, \
         pekerjaan = ?15, status_pernikahan = ?16, agama = ?17, catatan = ?18, \
         doctor_id = ?19, status = ?20, updated_at = ?21
         WHERE id = ?22",
        params![
            patient.nama,
            patient.email,
            patient.telepon,
            patient.alamat,
            patient.tanggal_lahir,
            patient.jenis_kelamin.as_str(),
            patient.nomor_identitas,
            patient.jenis_identitas.as_str(),
            patient.golongan_darah.map(|b| b.as_str()),
            patient.alergi,
            patient.riwayat_penyakit,
            patient.kontak_darurat_nama,
            patient.kontak_darurat_telepon,
            patient.kontak_darurat_hubungan,
            patient.pekerjaan,
            patient.status_pernikahan.map(|s| s.as_str()),
            patient.agama.map(|a| a.as_str()),
            patient.catatan,
            patient.doctor_id,
            patient.status.as_str(),
            Utc::now(),
            patient.id,
        ],
    )?;
    Ok(())
}

/// Soft delete: stamp `deleted_at`, keep the row. Returns false when the
/// id does not exist or is already deleted.
pub fn soft_delete_patient(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE pasiens SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![Utc::now(), id],
    )?;
    Ok(affected > 0)
}

/// Uniqueness probes span soft-deleted rows: a deleted patient's
/// identifiers cannot be reused.
pub fn nomor_identitas_exists(
    conn: &Connection,
    nomor_identitas: &str,
    exclude_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens \
         WHERE nomor_identitas = ?1 AND id != COALESCE(?2, -1)",
        params![nomor_identitas, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn email_exists(
    conn: &Connection,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens WHERE email = ?1 AND id != COALESCE(?2, -1)",
        params![email, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Filtered, sorted, paginated listing. Soft-deleted rows are excluded.
pub fn list_patients(
    conn: &Connection,
    filter: &PatientListFilter,
    sort: SortSpec,
    page: PageRequest,
) -> Result<(Vec<PatientRecord>, i64), DatabaseError> {
    let mut where_clauses: Vec<String> = vec!["p.deleted_at IS NULL".into()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(term) = filter.search.as_deref().filter(|t| !t.is_empty()) {
        where_clauses.push(format!(
            "(p.nama LIKE ?{n} OR p.email LIKE ?{n} OR p.telepon LIKE ?{n} \
             OR p.nomor_rekam_medis LIKE ?{n} OR p.nomor_identitas LIKE ?{n})",
            n = params_vec.len() + 1
        ));
        params_vec.push(Box::new(format!("%{term}%")));
    }
    if let Some(status) = filter.status {
        where_clauses.push(format!("p.status = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(status.as_str()));
    }
    if let Some(gender) = filter.jenis_kelamin {
        where_clauses.push(format!("p.jenis_kelamin = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(gender.as_str()));
    }
    if let Some(doctor_id) = filter.doctor_id {
        where_clauses.push(format!("p.doctor_id = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(doctor_id));
    }

    let where_sql = where_clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM pasiens p WHERE {where_sql}"),
        rusqlite::params_from_iter(params_vec.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {PATIENT_COLUMNS}, d.name FROM pasiens p \
         LEFT JOIN users d ON d.id = p.doctor_id \
         WHERE {where_sql} ORDER BY p.{} LIMIT ?{} OFFSET ?{}",
        sort.order_clause(),
        params_vec.len() + 1,
        params_vec.len() + 2,
    );
    params_vec.push(Box::new(page.per_page));
    params_vec.push(Box::new(page.offset()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), record_from_row)?;
    let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((records, total))
}

/// Quick lookup: substring match over name/email/phone/record number/
/// national id, capped at `limit` rows.
pub fn search_patients(
    conn: &Connection,
    term: &str,
    limit: u32,
) -> Result<Vec<PatientRecord>, DatabaseError> {
    let pattern = format!("%{term}%");
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS}, d.name FROM pasiens p \
         LEFT JOIN users d ON d.id = p.doctor_id \
         WHERE p.deleted_at IS NULL AND \
               (p.nama LIKE ?1 OR p.email LIKE ?1 OR p.telepon LIKE ?1 \
                OR p.nomor_rekam_medis LIKE ?1 OR p.nomor_identitas LIKE ?1) \
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![pattern, limit], record_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn recent_patients(conn: &Connection, limit: u32) -> Result<Vec<PatientRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS}, d.name FROM pasiens p \
         LEFT JOIN users d ON d.id = p.doctor_id \
         WHERE p.deleted_at IS NULL \
         ORDER BY p.created_at DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], record_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Active patients of one doctor, alphabetical, paginated.
pub fn doctor_patients(
    conn: &Connection,
    doctor_id: i64,
    page: PageRequest,
) -> Result<(Vec<Patient>, i64), DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE p.doctor_id = ?1 AND p.status = 'aktif' AND p.deleted_at IS NULL",
        params![doctor_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM pasiens p \
         WHERE p.doctor_id = ?1 AND p.status = 'aktif' AND p.deleted_at IS NULL \
         ORDER BY p.nama LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(
        params![doctor_id, page.per_page, page.offset()],
        patient_from_row,
    )?;
    let patients = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((patients, total))
}

/// Every active patient of one doctor, alphabetical. Embedded in the
/// doctor detail response.
pub fn all_active_patients_of_doctor(
    conn: &Connection,
    doctor_id: i64,
) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM pasiens p \
         WHERE p.doctor_id = ?1 AND p.status = 'aktif' AND p.deleted_at IS NULL \
         ORDER BY p.nama"
    ))?;
    let rows = stmt.query_map(params![doctor_id], patient_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ── Aggregate queries (dashboard & statistics) ──────────────

pub fn count_patients(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p WHERE p.deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_by_status(conn: &Connection, status: PatientStatus) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p WHERE p.status = ?1 AND p.deleted_at IS NULL",
        params![status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_by_gender(conn: &Connection, gender: Gender) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p WHERE p.jenis_kelamin = ?1 AND p.deleted_at IS NULL",
        params![gender.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_created_on(conn: &Connection, date: NaiveDate) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE date(p.created_at) = ?1 AND p.deleted_at IS NULL",
        params![date.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_created_between(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE date(p.created_at) BETWEEN ?1 AND ?2 AND p.deleted_at IS NULL",
        params![start.to_string(), end.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_created_in_month(
    conn: &Connection,
    year: i32,
    month: u32,
) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE strftime('%Y-%m', p.created_at) = ?1 AND p.deleted_at IS NULL",
        params![format!("{year:04}-{month:02}")],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_created_in_year(conn: &Connection, year: i32) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE strftime('%Y', p.created_at) = ?1 AND p.deleted_at IS NULL",
        params![format!("{year:04}")],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// One count per calendar month of `year`, index 0 = January.
pub fn monthly_registrations(conn: &Connection, year: i32) -> Result<[i64; 12], DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT CAST(strftime('%m', p.created_at) AS INTEGER), COUNT(*) \
         FROM pasiens p \
         WHERE strftime('%Y', p.created_at) = ?1 AND p.deleted_at IS NULL \
         GROUP BY 1",
    )?;
    let rows = stmt.query_map(params![format!("{year:04}")], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut buckets = [0i64; 12];
    for row in rows {
        let (month, count) = row?;
        if (1..=12).contains(&month) {
            buckets[(month - 1) as usize] = count;
        }
    }
    Ok(buckets)
}

/// Age-bucket histogram. `active_only` matches the dashboard (active
/// patients); the patient statistics endpoint passes false (all statuses).
pub fn age_group_counts(conn: &Connection, active_only: bool) -> Result<AgeGroups, DatabaseError> {
    let status_sql = if active_only {
        "AND p.status = 'aktif'"
    } else {
        ""
    };
    let sql = format!(
        "SELECT \
         COALESCE(SUM({AGE_EXPR} < 18), 0), \
         COALESCE(SUM({AGE_EXPR} BETWEEN 18 AND 30), 0), \
         COALESCE(SUM({AGE_EXPR} BETWEEN 31 AND 50), 0), \
         COALESCE(SUM({AGE_EXPR} > 50), 0) \
         FROM pasiens p WHERE p.deleted_at IS NULL {status_sql}"
    );
    let groups = conn.query_row(&sql, [], |row| {
        Ok(AgeGroups {
            anak: row.get(0)?,
            dewasa_muda: row.get(1)?,
            dewasa: row.get(2)?,
            lansia: row.get(3)?,
        })
    })?;
    Ok(groups)
}

pub fn blood_type_distribution(
    conn: &Connection,
    active_only: bool,
) -> Result<Vec<(String, i64)>, DatabaseError> {
    let status_sql = if active_only {
        "AND p.status = 'aktif'"
    } else {
        ""
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT p.golongan_darah, COUNT(*) AS count FROM pasiens p \
         WHERE p.golongan_darah IS NOT NULL AND p.deleted_at IS NULL {status_sql} \
         GROUP BY p.golongan_darah ORDER BY count DESC"
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Active patients without an assigned doctor.
pub fn unassigned_active_count(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE p.doctor_id IS NULL AND p.status = 'aktif' AND p.deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Active patients missing email, blood type, allergy text or the
/// emergency contact name.
pub fn incomplete_profile_active_count(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE (p.email IS NULL OR p.golongan_darah IS NULL \
                OR p.alergi IS NULL OR p.kontak_darurat_nama = '') \
           AND p.status = 'aktif' AND p.deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Active patients that do have a doctor assigned.
pub fn assigned_active_count(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens p \
         WHERE p.doctor_id IS NOT NULL AND p.status = 'aktif' AND p.deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Addresses of active patients, for the location breakdown.
pub fn active_addresses(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.alamat FROM pasiens p \
         WHERE p.alamat != '' AND p.status = 'aktif' AND p.deleted_at IS NULL",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
