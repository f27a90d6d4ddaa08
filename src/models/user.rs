use chrono::{DateTime, NaiveDate, Utc};

use super::enums::{Gender, Role};

/// A staff identity: admins, doctors, nurses and front-desk staff all live
/// in the same table, discriminated by `role`. The doctor-only fields
/// (`specialization`, `license_number`) stay `None` for other roles.
///
/// `password_hash` is deliberately kept out of any serialized response;
/// endpoints build their own response structs.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_doctor(&self) -> bool {
        self.has_role(Role::Doctor)
    }

    /// "Name (Role label)" as shown in activity feeds
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.role.label())
    }

    /// Up to two initials for avatars
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .flat_map(|c| c.to_uppercase())
            .collect()
    }
}
