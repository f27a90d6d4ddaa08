use super::enums::{Gender, PatientStatus};

/// Hard cap on page size, regardless of what the client asks for.
pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_PER_PAGE: u32 = 15;

/// Resolved sort: always one of the allow-listed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub descending: bool,
}

impl SortSpec {
    /// Resolve a client-supplied sort against an allow-list. Unknown fields
    /// are silently ignored and the default applies; same for sort_order
    /// outside asc|desc.
    pub fn resolve(
        sort_by: Option<&str>,
        sort_order: Option<&str>,
        allowed: &[&'static str],
        default: SortSpec,
    ) -> SortSpec {
        let column = sort_by
            .and_then(|requested| allowed.iter().find(|a| **a == requested))
            .copied();

        match column {
            Some(column) => {
                let descending = match sort_order {
                    Some("asc") => false,
                    Some("desc") => true,
                    _ => default.descending,
                };
                SortSpec { column, descending }
            }
            None => default,
        }
    }

    pub fn order_clause(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("{} {}", self.column, dir)
    }
}

/// 1-based page request with a clamped page size.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.per_page
    }
}

/// Filters accepted by the patient listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct PatientListFilter {
    pub search: Option<String>,
    pub status: Option<PatientStatus>,
    pub jenis_kelamin: Option<Gender>,
    pub doctor_id: Option<i64>,
}

/// Filters accepted by the doctor listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct DoctorListFilter {
    pub search: Option<String>,
    pub specialization: Option<String>,
}

pub const PATIENT_SORT_FIELDS: &[&str] = &[
    "nama",
    "email",
    "telepon",
    "tanggal_lahir",
    "created_at",
    "updated_at",
];

pub const DOCTOR_SORT_FIELDS: &[&str] = &["name", "email", "specialization", "created_at"];

pub const PATIENT_DEFAULT_SORT: SortSpec = SortSpec {
    column: "created_at",
    descending: true,
};

pub const DOCTOR_DEFAULT_SORT: SortSpec = SortSpec {
    column: "name",
    descending: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_field_falls_back_to_default() {
        let sort = SortSpec::resolve(
            Some("unknown_field"),
            Some("asc"),
            PATIENT_SORT_FIELDS,
            PATIENT_DEFAULT_SORT,
        );
        assert_eq!(sort, PATIENT_DEFAULT_SORT);
        assert_eq!(sort.order_clause(), "created_at DESC");
    }

    #[test]
    fn allowed_sort_field_is_used() {
        let sort = SortSpec::resolve(
            Some("nama"),
            Some("asc"),
            PATIENT_SORT_FIELDS,
            PATIENT_DEFAULT_SORT,
        );
        assert_eq!(sort.column, "nama");
        assert!(!sort.descending);
    }

    #[test]
    fn invalid_sort_order_uses_default_direction() {
        let sort = SortSpec::resolve(
            Some("name"),
            Some("sideways"),
            DOCTOR_SORT_FIELDS,
            DOCTOR_DEFAULT_SORT,
        );
        assert_eq!(sort.column, "name");
        assert!(!sort.descending);
    }

    #[test]
    fn per_page_is_capped_at_100() {
        let page = PageRequest::new(Some(2), Some(500), DEFAULT_PER_PAGE);
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.offset(), 100);
    }

    #[test]
    fn page_defaults_to_first() {
        let page = PageRequest::new(None, None, DEFAULT_PER_PAGE);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 15);
        assert_eq!(page.offset(), 0);
    }
}
