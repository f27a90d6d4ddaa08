//! Role-based access control: a static role→permission table plus the
//! exact-match role check used by the admin route guard.
//!
//! Permissions are plain strings tested by membership. There is no role
//! hierarchy: an admin is not implicitly allowed on doctor-only routes
//! unless `admin` is listed in the required set.

use crate::models::Role;

/// Permission strings granted to each role. Coarse-grained by design.
pub fn permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin => &[
            "users.create",
            "users.read",
            "users.update",
            "users.delete",
            "patients.create",
            "patients.read",
            "patients.update",
            "patients.delete",
            "doctors.create",
            "doctors.read",
            "doctors.update",
            "doctors.delete",
            "dashboard.read",
            "reports.read",
            "settings.update",
        ],
        Role::Doctor => &[
            "patients.create",
            "patients.read",
            "patients.update",
            "dashboard.read",
            "schedule.read",
            "schedule.update",
        ],
        Role::Nurse => &["patients.read", "patients.update", "dashboard.read"],
        Role::Staff => &["patients.read", "dashboard.read"],
    }
}

pub fn has_permission(role: Role, permission: &str) -> bool {
    permissions(role).contains(&permission)
}

/// Why an access check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    Unauthenticated,
    Forbidden {
        required_roles: Vec<&'static str>,
        user_role: &'static str,
    },
}

/// Allow when an identity is present and its role appears in `required`.
/// An empty `required` list only demands authentication.
pub fn authorize(role: Option<Role>, required: &[Role]) -> Result<(), AccessDenied> {
    let role = role.ok_or(AccessDenied::Unauthenticated)?;
    if required.is_empty() || required.contains(&role) {
        Ok(())
    } else {
        Err(AccessDenied::Forbidden {
            required_roles: required.iter().map(|r| r.as_str()).collect(),
            user_role: role.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_full_crud() {
        for permission in [
            "users.delete",
            "patients.delete",
            "doctors.create",
            "settings.update",
        ] {
            assert!(has_permission(Role::Admin, permission));
        }
        assert_eq!(permissions(Role::Admin).len(), 15);
    }

    #[test]
    fn doctor_cannot_delete_patients() {
        assert!(has_permission(Role::Doctor, "patients.create"));
        assert!(!has_permission(Role::Doctor, "patients.delete"));
        assert!(has_permission(Role::Doctor, "schedule.update"));
    }

    #[test]
    fn nurse_reads_and_updates_only() {
        assert!(has_permission(Role::Nurse, "patients.update"));
        assert!(!has_permission(Role::Nurse, "patients.create"));
    }

    #[test]
    fn staff_is_read_only() {
        assert!(has_permission(Role::Staff, "patients.read"));
        assert!(!has_permission(Role::Staff, "patients.update"));
        assert!(has_permission(Role::Staff, "dashboard.read"));
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        assert_eq!(
            authorize(None, &[Role::Admin]),
            Err(AccessDenied::Unauthenticated)
        );
    }

    #[test]
    fn staff_denied_on_admin_route_with_diagnostics() {
        let denied = authorize(Some(Role::Staff), &[Role::Admin]).unwrap_err();
        assert_eq!(
            denied,
            AccessDenied::Forbidden {
                required_roles: vec!["admin"],
                user_role: "staff",
            }
        );
    }

    #[test]
    fn no_role_hierarchy() {
        // Admin is not implicitly allowed on a doctor-only requirement.
        assert!(authorize(Some(Role::Admin), &[Role::Doctor]).is_err());
    }

    #[test]
    fn empty_requirement_only_needs_authentication() {
        assert!(authorize(Some(Role::Staff), &[]).is_ok());
    }
}
