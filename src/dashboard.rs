//! Dashboard aggregation: overview statistics, the recent-activity feed
//! and operational notifications. Everything here is read-only and works
//! on a borrowed connection.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::db::repository::{patient, user};
use crate::db::DatabaseError;
use crate::models::{Gender, PatientStatus, Role};

const TOP_LOCATIONS: usize = 10;
const ACTIVITY_PATIENTS: u32 = 10;
const ACTIVITY_USERS: u32 = 5;
const ACTIVITY_CAP: usize = 20;
const PATIENTS_PER_DOCTOR_ALERT: f64 = 50.0;
const REGISTRATIONS_TODAY_ALERT: i64 = 5;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Indonesian relative timestamp, coarse buckets only.
pub fn time_ago(moment: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - moment).num_seconds().max(0);
    match seconds {
        0..=59 => "baru saja".to_string(),
        60..=3_599 => format!("{} menit yang lalu", seconds / 60),
        3_600..=86_399 => format!("{} jam yang lalu", seconds / 3_600),
        86_400..=604_799 => format!("{} hari yang lalu", seconds / 86_400),
        604_800..=2_591_999 => format!("{} minggu yang lalu", seconds / 604_800),
        2_592_000..=31_535_999 => format!("{} bulan yang lalu", seconds / 2_592_000),
        _ => format!("{} tahun yang lalu", seconds / 31_536_000),
    }
}

/// The city is the last comma-separated segment of an address.
pub fn extract_location(alamat: &str) -> Option<String> {
    alamat
        .rsplit(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn top_locations(addresses: &[String]) -> Vec<(String, i64)> {
    let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for alamat in addresses {
        if let Some(location) = extract_location(alamat) {
            *counts.entry(location).or_default() += 1;
        }
    }
    let mut sorted: Vec<(String, i64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(TOP_LOCATIONS);
    sorted
}

fn start_of_week(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

/// Full overview payload for `GET /api/dashboard/stats`.
pub fn overview(conn: &Connection, now: DateTime<Utc>) -> Result<Value, DatabaseError> {
    let today = now.date_naive();

    let stats = json!({
        "total_patients": patient::count_patients(conn)?,
        "total_doctors": user::count_by_role(conn, Role::Doctor)?,
        "total_nurses": user::count_by_role(conn, Role::Nurse)?,
        "total_staff": user::count_by_role(conn, Role::Staff)?,
        "active_patients": patient::count_by_status(conn, PatientStatus::Active)?,
        "new_patients_today": patient::count_created_on(conn, today)?,
        "new_patients_this_week":
            patient::count_created_between(conn, start_of_week(today), today)?,
        "new_patients_this_month":
            patient::count_created_in_month(conn, today.year(), today.month())?,
        "male_patients": patient::count_by_gender(conn, Gender::Male)?,
        "female_patients": patient::count_by_gender(conn, Gender::Female)?,
    });

    let monthly = patient::monthly_registrations(conn, today.year())?;
    let monthly_registrations: Vec<Value> = monthly
        .iter()
        .enumerate()
        .map(|(i, count)| {
            json!({
                "month": i + 1,
                "month_name": MONTH_NAMES[i],
                "count": count,
            })
        })
        .collect();

    let ages = patient::age_group_counts(conn, true)?;
    let age_groups = json!([
        {"label": "Anak (< 18)", "count": ages.anak},
        {"label": "Dewasa Muda (18-30)", "count": ages.dewasa_muda},
        {"label": "Dewasa (31-50)", "count": ages.dewasa},
        {"label": "Lansia (> 50)", "count": ages.lansia},
    ]);

    let mut recent_activity = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = today - Duration::days(offset);
        recent_activity.push(json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "day_name": date.format("%A").to_string(),
            "count": patient::count_created_on(conn, date)?,
        }));
    }

    let doctor_assignments: Vec<Value> = user::doctor_workloads(conn)?
        .iter()
        .take(10)
        .map(|(doctor, count)| {
            json!({
                "id": doctor.id,
                "name": doctor.name,
                "specialization": doctor.specialization,
                "patient_count": count,
                "email": doctor.email,
            })
        })
        .collect();

    let addresses = patient::active_addresses(conn)?;
    let locations: Vec<Value> = top_locations(&addresses)
        .into_iter()
        .map(|(location, count)| json!({"location": location, "count": count}))
        .collect();

    let blood_types: Vec<Value> = patient::blood_type_distribution(conn, true)?
        .into_iter()
        .map(|(blood_type, count)| json!({"type": blood_type, "count": count}))
        .collect();

    let total_records = patient::count_patients(conn)? + user::count_users(conn)?;
    let system_health = json!({
        "database_status": "healthy",
        "total_records": total_records,
        "disk_usage": "65%",
        "memory_usage": "45%",
        "uptime": "99.9%",
        "last_backup": (now - Duration::hours(6)).to_rfc3339(),
        "response_time": "125ms",
    });

    Ok(json!({
        "stats": stats,
        "monthly_registrations": monthly_registrations,
        "age_groups": age_groups,
        "recent_activity": recent_activity,
        "doctor_assignments": doctor_assignments,
        "top_locations": locations,
        "blood_type_distribution": blood_types,
        "system_health": system_health,
    }))
}

/// Merged registration feed: newest patients and users, newest first.
pub fn activities(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Value>, DatabaseError> {
    let mut feed: Vec<(DateTime<Utc>, Value)> = Vec::new();

    for record in patient::recent_patients(conn, ACTIVITY_PATIENTS)? {
        let p = &record.patient;
        feed.push((
            p.created_at,
            json!({
                "id": format!("patient_{}", p.id),
                "type": "patient_registration",
                "title": "Pendaftaran Pasien Baru",
                "description": format!("Pasien {} telah terdaftar", p.nama),
                "patient": {
                    "id": p.id,
                    "nama": p.nama,
                    "nomor_rekam_medis": p.nomor_rekam_medis,
                },
                "doctor": record.doctor,
                "time_ago": time_ago(p.created_at, now),
            }),
        ));
    }

    for u in user::recent_users(conn, ACTIVITY_USERS)? {
        feed.push((
            u.created_at,
            json!({
                "id": format!("user_{}", u.id),
                "type": "user_registration",
                "title": "Pengguna Baru Terdaftar",
                "description": format!("Pengguna {} ({}) telah terdaftar", u.name, u.role.label()),
                "user": {
                    "id": u.id,
                    "name": u.name,
                    "role": u.role.as_str(),
                    "role_label": u.role.label(),
                },
                "time_ago": time_ago(u.created_at, now),
            }),
        ));
    }

    feed.sort_by(|a, b| b.0.cmp(&a.0));
    feed.truncate(ACTIVITY_CAP);
    Ok(feed.into_iter().map(|(_, entry)| entry).collect())
}

fn priority_rank(priority: &str) -> u8 {
    match priority {
        "high" => 0,
        "medium" => 1,
        _ => 2,
    }
}

/// Operational alerts derived from current data.
pub fn notifications(conn: &Connection, today: NaiveDate) -> Result<Vec<Value>, DatabaseError> {
    let mut items: Vec<Value> = Vec::new();

    let unassigned = patient::unassigned_active_count(conn)?;
    if unassigned > 0 {
        items.push(json!({
            "id": "unassigned_patients",
            "type": "warning",
            "priority": "medium",
            "message": format!("{unassigned} pasien belum memiliki dokter yang ditugaskan"),
            "action_text": "Lihat Pasien",
            "action_url": "/pasien?filter=unassigned",
        }));
    }

    let incomplete = patient::incomplete_profile_active_count(conn)?;
    if incomplete > 0 {
        items.push(json!({
            "id": "incomplete_profiles",
            "type": "info",
            "priority": "low",
            "message": format!("{incomplete} pasien memiliki profil yang tidak lengkap"),
            "action_text": "Lengkapi Data",
            "action_url": "/pasien?filter=incomplete",
        }));
    }

    let doctors = user::count_by_role(conn, Role::Doctor)?;
    let active = patient::count_by_status(conn, PatientStatus::Active)?;
    if doctors > 0 {
        let load = active as f64 / doctors as f64;
        if load > PATIENTS_PER_DOCTOR_ALERT {
            items.push(json!({
                "id": "high_patient_load",
                "type": "warning",
                "priority": "high",
                "message": format!(
                    "Rata-rata {} pasien per dokter. Pertimbangkan menambah dokter.",
                    load.round() as i64
                ),
                "action_text": "Lihat Statistik",
                "action_url": "/dashboard/statistics",
            }));
        }
    }

    let today_count = patient::count_created_on(conn, today)?;
    if today_count > REGISTRATIONS_TODAY_ALERT {
        items.push(json!({
            "id": "high_registrations_today",
            "type": "success",
            "priority": "medium",
            "message": format!("{today_count} pasien baru terdaftar hari ini"),
            "action_text": "Lihat Pasien Baru",
            "action_url": "/pasien?filter=today",
        }));
    }

    items.sort_by_key(|item| {
        priority_rank(item["priority"].as_str().unwrap_or("low"))
    });
    Ok(items)
}
