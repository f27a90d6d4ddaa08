use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{TokenKind, User};

use super::parse_column;

/// Store a freshly issued token hash. Only the SHA-256 of the bearer
/// string is persisted; the plaintext never touches the database.
pub fn insert_token(
    conn: &Connection,
    user_id: i64,
    token_hash: &str,
    kind: TokenKind,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO tokens (user_id, token_hash, kind, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, token_hash, kind.as_str(), Utc::now()],
    )?;
    Ok(())
}

/// Resolve a token hash of the given kind to its owner and stamp
/// `last_used_at`. Auth tokens never match on the refresh path and
/// vice versa.
pub fn find_user_by_token(
    conn: &Connection,
    token_hash: &str,
    kind: TokenKind,
) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT u.id, u.name, u.email, u.password_hash, u.role, u.phone, u.address, \
             u.date_of_birth, u.gender, u.specialization, u.license_number, \
             u.email_verified_at, u.created_at, u.updated_at \
             FROM tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.token_hash = ?1 AND t.kind = ?2",
            params![token_hash, kind.as_str()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    password_hash: row.get(3)?,
                    role: parse_column(4, row.get::<_, String>(4)?)?,
                    phone: row.get(5)?,
                    address: row.get(6)?,
                    date_of_birth: row.get(7)?,
                    gender: super::parse_column_opt(8, row.get::<_, Option<String>>(8)?)?,
                    specialization: row.get(9)?,
                    license_number: row.get(10)?,
                    email_verified_at: row.get(11)?,
                    created_at: row.get(12)?,
                    updated_at: row.get(13)?,
                })
            },
        )
        .optional()?;

    if row.is_some() {
        conn.execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE token_hash = ?2",
            params![Utc::now(), token_hash],
        )?;
    }
    Ok(row)
}

/// Revoke one token. Returns false when the hash was not present.
pub fn revoke_token(conn: &Connection, token_hash: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM tokens WHERE token_hash = ?1",
        params![token_hash],
    )?;
    Ok(affected > 0)
}

/// Revoke every token the user holds, both kinds. Used on password change.
pub fn revoke_all_tokens(conn: &Connection, user_id: i64) -> Result<u32, DatabaseError> {
    let affected = conn.execute("DELETE FROM tokens WHERE user_id = ?1", params![user_id])?;
    Ok(affected as u32)
}

pub fn count_tokens(conn: &Connection, user_id: i64) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tokens WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::user::{insert_user, NewUser};
    use crate::models::Role;

    fn seeded_user(conn: &Connection) -> User {
        insert_user(
            conn,
            &NewUser {
                name: "Admin".into(),
                email: "admin@klinik.test".into(),
                password_hash: "hash".into(),
                role: Role::Admin,
                phone: None,
                address: None,
                date_of_birth: None,
                gender: None,
                specialization: None,
                license_number: None,
                email_verified_at: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn token_round_trip_stamps_last_used() {
        let conn = open_memory_database().unwrap();
        let user = seeded_user(&conn);
        insert_token(&conn, user.id, "hash-a", TokenKind::Auth).unwrap();

        let found = find_user_by_token(&conn, "hash-a", TokenKind::Auth)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);

        let last_used: Option<String> = conn
            .query_row(
                "SELECT last_used_at FROM tokens WHERE token_hash = 'hash-a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(last_used.is_some());
    }

    #[test]
    fn kinds_do_not_cross_over() {
        let conn = open_memory_database().unwrap();
        let user = seeded_user(&conn);
        insert_token(&conn, user.id, "hash-refresh", TokenKind::Refresh).unwrap();

        assert!(find_user_by_token(&conn, "hash-refresh", TokenKind::Auth)
            .unwrap()
            .is_none());
        assert!(find_user_by_token(&conn, "hash-refresh", TokenKind::Refresh)
            .unwrap()
            .is_some());
    }

    #[test]
    fn unknown_hash_resolves_to_none() {
        let conn = open_memory_database().unwrap();
        seeded_user(&conn);
        assert!(find_user_by_token(&conn, "nope", TokenKind::Auth)
            .unwrap()
            .is_none());
    }

    #[test]
    fn revoke_single_token_leaves_others() {
        let conn = open_memory_database().unwrap();
        let user = seeded_user(&conn);
        insert_token(&conn, user.id, "hash-a", TokenKind::Auth).unwrap();
        insert_token(&conn, user.id, "hash-b", TokenKind::Refresh).unwrap();

        assert!(revoke_token(&conn, "hash-a").unwrap());
        assert!(!revoke_token(&conn, "hash-a").unwrap());
        assert_eq!(count_tokens(&conn, user.id).unwrap(), 1);
    }

    #[test]
    fn revoke_all_clears_both_kinds() {
        let conn = open_memory_database().unwrap();
        let user = seeded_user(&conn);
        insert_token(&conn, user.id, "hash-a", TokenKind::Auth).unwrap();
        insert_token(&conn, user.id, "hash-b", TokenKind::Refresh).unwrap();

        assert_eq!(revoke_all_tokens(&conn, user.id).unwrap(), 2);
        assert_eq!(count_tokens(&conn, user.id).unwrap(), 0);
    }

    #[test]
    fn deleting_user_cascades_tokens() {
        let conn = open_memory_database().unwrap();
        let user = seeded_user(&conn);
        insert_token(&conn, user.id, "hash-a", TokenKind::Auth).unwrap();

        crate::db::repository::user::delete_user(&conn, user.id).unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
