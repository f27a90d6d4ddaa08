use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use super::enums::{BloodType, Gender, IdentityType, MaritalStatus, PatientStatus, Religion};

/// A patient record. Soft-deleted rows keep their data (and their unique
/// nomor_identitas / nomor_rekam_medis) but carry a `deleted_at` timestamp
/// and are excluded from default queries.
#[derive(Debug, Clone)]
pub struct Patient {
    pub id: i64,
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
    pub status: PatientStatus,
    pub nomor_rekam_medis: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Minimal reference to the assigned doctor, embedded in patient responses.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorRef {
    pub id: i64,
    pub name: String,
}

/// Patient plus its resolved doctor reference (LEFT JOIN result).
#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub patient: Patient,
    pub doctor: Option<DoctorRef>,
}

impl Patient {
    /// Whole years between tanggal_lahir and `today`
    pub fn umur(&self, today: NaiveDate) -> i32 {
        age_on(self.tanggal_lahir, today)
    }

    /// "Nama (RM...)"
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.nama, self.nomor_rekam_medis)
    }

    /// "Nama (telepon) - hubungan"
    pub fn emergency_contact(&self) -> String {
        format!(
            "{} ({}) - {}",
            self.kontak_darurat_nama, self.kontak_darurat_telepon, self.kontak_darurat_hubungan
        )
    }

    /// Address with a placeholder for blank values
    pub fn formatted_alamat(&self) -> &str {
        if self.alamat.is_empty() {
            "Alamat tidak tersedia"
        } else {
            &self.alamat
        }
    }

    pub fn has_allergies(&self) -> bool {
        self.alergi.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn has_medical_history(&self) -> bool {
        self.riwayat_penyakit
            .as_deref()
            .is_some_and(|r| !r.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.status == PatientStatus::Active
    }
}

/// Whole years from `birth` to `today`, decremented when the birthday has
/// not yet occurred this year.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}
