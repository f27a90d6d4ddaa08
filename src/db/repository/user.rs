use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::{
    DoctorListFilter, Gender, PageRequest, Role, SortSpec, User,
};

use super::{parse_column, parse_column_opt};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, phone, address, \
     date_of_birth, gender, specialization, license_number, \
     email_verified_at, created_at, updated_at";

/// Fields accepted at creation time. Timestamps are set here.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: parse_column(4, row.get::<_, String>(4)?)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        date_of_birth: row.get(7)?,
        gender: parse_column_opt(8, row.get::<_, Option<String>>(8)?)?,
        specialization: row.get(9)?,
        license_number: row.get(10)?,
        email_verified_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub fn insert_user(conn: &Connection, new: &NewUser) -> Result<User, DatabaseError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (name, email, password_hash, role, phone, address, \
         date_of_birth, gender, specialization, license_number, \
         email_verified_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            new.name,
            new.email,
            new.password_hash,
            new.role.as_str(),
            new.phone,
            new.address,
            new.date_of_birth,
            new.gender.map(|g| g.as_str()),
            new.specialization,
            new.license_number,
            new.email_verified_at,
            now,
            now,
        ],
    )?;

    let id = conn.last_insert_rowid();
    find_user(conn, id)?.ok_or(DatabaseError::NotFound {
        entity_type: "user".into(),
        id: id.to_string(),
    })
}

pub fn find_user(conn: &Connection, id: i64) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Uniqueness probe, optionally excluding one row (partial-update semantics).
pub fn email_exists(
    conn: &Connection,
    email: &str,
    exclude_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != COALESCE(?2, -1)",
        params![email, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn license_number_exists(
    conn: &Connection,
    license_number: &str,
    exclude_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE license_number = ?1 AND id != COALESCE(?2, -1)",
        params![license_number, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Persist every mutable column of an already-loaded user.
pub fn update_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET name = ?1, email = ?2, password_hash = ?3, role = ?4, \
         phone = ?5, address = ?6, date_of_birth = ?7, gender = ?8, \
         specialization = ?9, license_number = ?10, email_verified_at = ?11, \
         updated_at = ?12
         WHERE id = ?13",
        params![
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.phone,
            user.address,
            user.date_of_birth,
            user.gender.map(|g| g.as_str()),
            user.specialization,
            user.license_number,
            user.email_verified_at,
            Utc::now(),
            user.id,
        ],
    )?;
    Ok(())
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn list_users(
    conn: &Connection,
    page: PageRequest,
) -> Result<(Vec<User>, i64), DatabaseError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt.query_map(params![page.per_page, page.offset()], user_from_row)?;
    let users = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((users, total))
}

pub fn count_by_role(conn: &Connection, role: Role) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![role.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

pub fn recent_users(conn: &Connection, limit: u32) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], user_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ── Doctor queries ──────────────────────────────────────────

/// Number of active, non-deleted patients assigned to the doctor.
pub fn active_patient_count(conn: &Connection, doctor_id: i64) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pasiens \
         WHERE doctor_id = ?1 AND status = 'aktif' AND deleted_at IS NULL",
        params![doctor_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Doctor listing: search, specialization filter, allow-listed sort,
/// pagination. Each row carries its active patient count.
pub fn list_doctors(
    conn: &Connection,
    filter: &DoctorListFilter,
    sort: SortSpec,
    page: PageRequest,
) -> Result<(Vec<(User, i64)>, i64), DatabaseError> {
    let mut where_clauses: Vec<String> = vec!["role = 'doctor'".into()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(term) = filter.search.as_deref().filter(|t| !t.is_empty()) {
        let pattern = format!("%{term}%");
        where_clauses.push(format!(
            "(name LIKE ?{n} OR email LIKE ?{n} OR specialization LIKE ?{n} \
             OR license_number LIKE ?{n})",
            n = params_vec.len() + 1
        ));
        params_vec.push(Box::new(pattern));
    }

    if let Some(spec) = filter.specialization.as_deref().filter(|s| !s.is_empty()) {
        where_clauses.push(format!("specialization = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(spec.to_string()));
    }

    let where_sql = where_clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE {where_sql}"),
        rusqlite::params_from_iter(params_vec.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {USER_COLUMNS}, \
         (SELECT COUNT(*) FROM pasiens p \
          WHERE p.doctor_id = users.id AND p.status = 'aktif' AND p.deleted_at IS NULL) \
         FROM users WHERE {where_sql} \
         ORDER BY {} LIMIT ?{} OFFSET ?{}",
        sort.order_clause(),
        params_vec.len() + 1,
        params_vec.len() + 2,
    );
    params_vec.push(Box::new(page.per_page));
    params_vec.push(Box::new(page.offset()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
        Ok((user_from_row(row)?, row.get::<_, i64>(14)?))
    })?;
    let doctors = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((doctors, total))
}

/// All doctors with their active patient counts, heaviest load first.
pub fn doctor_workloads(conn: &Connection) -> Result<Vec<(User, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS}, \
         (SELECT COUNT(*) FROM pasiens p \
          WHERE p.doctor_id = users.id AND p.status = 'aktif' AND p.deleted_at IS NULL) \
         AS patient_count \
         FROM users WHERE role = 'doctor' ORDER BY patient_count DESC"
    ))?;
    let rows = stmt.query_map([], |row| Ok((user_from_row(row)?, row.get::<_, i64>(14)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Doctors that have at least one (non-deleted) patient assigned.
pub fn doctors_with_patients(conn: &Connection) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users u WHERE u.role = 'doctor' AND EXISTS \
         (SELECT 1 FROM pasiens p WHERE p.doctor_id = u.id AND p.deleted_at IS NULL)",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn specialization_distribution(
    conn: &Connection,
) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT specialization, COUNT(*) AS count FROM users \
         WHERE role = 'doctor' AND specialization IS NOT NULL \
         GROUP BY specialization ORDER BY count DESC",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::models::{DOCTOR_DEFAULT_SORT, DOCTOR_SORT_FIELDS};

    fn new_user(name: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role,
            phone: None,
            address: None,
            date_of_birth: None,
            gender: None,
            specialization: (role == Role::Doctor).then(|| "Umum".to_string()),
            license_number: (role == Role::Doctor).then(|| format!("STR-{email}")),
            email_verified_at: Some(Utc::now()),
        }
    }

    #[test]
    fn insert_and_find_round_trip() {
        let conn = open_memory_database().unwrap();
        let user = insert_user(&conn, &new_user("Andi", "andi@klinik.test", Role::Staff)).unwrap();
        assert_eq!(user.role, Role::Staff);

        let found = find_user_by_email(&conn, "andi@klinik.test").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.name, "Andi");
    }

    #[test]
    fn duplicate_email_violates_constraint() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, &new_user("A", "dup@klinik.test", Role::Staff)).unwrap();
        let result = insert_user(&conn, &new_user("B", "dup@klinik.test", Role::Nurse));
        assert!(result.is_err());
    }

    #[test]
    fn email_exists_excludes_own_row() {
        let conn = open_memory_database().unwrap();
        let user = insert_user(&conn, &new_user("A", "a@klinik.test", Role::Staff)).unwrap();
        assert!(email_exists(&conn, "a@klinik.test", None).unwrap());
        assert!(!email_exists(&conn, "a@klinik.test", Some(user.id)).unwrap());
        assert!(!email_exists(&conn, "b@klinik.test", None).unwrap());
    }

    #[test]
    fn count_by_role_counts_only_that_role() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, &new_user("D1", "d1@klinik.test", Role::Doctor)).unwrap();
        insert_user(&conn, &new_user("D2", "d2@klinik.test", Role::Doctor)).unwrap();
        insert_user(&conn, &new_user("N", "n@klinik.test", Role::Nurse)).unwrap();
        assert_eq!(count_by_role(&conn, Role::Doctor).unwrap(), 2);
        assert_eq!(count_by_role(&conn, Role::Nurse).unwrap(), 1);
        assert_eq!(count_by_role(&conn, Role::Admin).unwrap(), 0);
    }

    #[test]
    fn doctor_list_searches_license_number() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, &new_user("Dr Sari", "sari@klinik.test", Role::Doctor)).unwrap();
        insert_user(&conn, &new_user("Dr Tono", "tono@klinik.test", Role::Doctor)).unwrap();
        insert_user(&conn, &new_user("Perawat", "p@klinik.test", Role::Nurse)).unwrap();

        let filter = DoctorListFilter {
            search: Some("STR-sari".into()),
            specialization: None,
        };
        let page = PageRequest::new(None, None, 15);
        let (doctors, total) =
            list_doctors(&conn, &filter, DOCTOR_DEFAULT_SORT, page).unwrap();
        assert_eq!(total, 1);
        assert_eq!(doctors[0].0.name, "Dr Sari");
    }

    #[test]
    fn doctor_list_sorts_by_allowed_field() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, &new_user("Zul", "z@klinik.test", Role::Doctor)).unwrap();
        insert_user(&conn, &new_user("Ana", "a@klinik.test", Role::Doctor)).unwrap();

        let sort = SortSpec::resolve(
            Some("name"),
            Some("asc"),
            DOCTOR_SORT_FIELDS,
            DOCTOR_DEFAULT_SORT,
        );
        let (doctors, _) = list_doctors(
            &conn,
            &DoctorListFilter::default(),
            sort,
            PageRequest::new(None, None, 15),
        )
        .unwrap();
        assert_eq!(doctors[0].0.name, "Ana");
        assert_eq!(doctors[1].0.name, "Zul");
    }

    #[test]
    fn delete_user_reports_whether_row_existed() {
        let conn = open_memory_database().unwrap();
        let user = insert_user(&conn, &new_user("A", "a@klinik.test", Role::Staff)).unwrap();
        assert!(delete_user(&conn, user.id).unwrap());
        assert!(!delete_user(&conn, user.id).unwrap());
    }
}
