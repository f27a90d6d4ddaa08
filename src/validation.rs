//! Request validation: per-field error collection producing the
//! `422 {message: "Validation errors", errors: {field: [messages]}}`
//! response shape.
//!
//! Rules run eagerly and collect every failing field before any database
//! work happens; uniqueness checks are the endpoints' responsibility since
//! they need a connection.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

/// Accumulated per-field validation messages.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Ok(()) when no rule failed, Err(self) otherwise.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Require a non-empty value. Returns the value when present.
pub fn require<'a>(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.add(field, format!("The {field} field is required."));
            None
        }
    }
}

pub fn check_max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("The {field} field must not be greater than {max} characters."),
        );
    }
}

pub fn check_min_len(errors: &mut FieldErrors, field: &str, value: &str, min: usize) {
    if value.chars().count() < min {
        errors.add(
            field,
            format!("The {field} field must be at least {min} characters."),
        );
    }
}

/// Minimal structural email check: exactly one `@`, non-empty local part,
/// dotted domain, no whitespace.
pub fn is_valid_email(value: &str) -> bool {
    if value.contains(char::is_whitespace) {
        return false;
    }
    let mut parts = value.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

pub fn check_email(errors: &mut FieldErrors, field: &str, value: &str) -> bool {
    if is_valid_email(value) {
        true
    } else {
        errors.add(
            field,
            format!("The {field} field must be a valid email address."),
        );
        false
    }
}

/// Parse a wire enum value, reporting Laravel's "selected ... invalid" message.
pub fn parse_enum<T: FromStr>(errors: &mut FieldErrors, field: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.add(field, format!("The selected {field} is invalid."));
            None
        }
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(errors: &mut FieldErrors, field: &str, value: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            errors.add(field, format!("The {field} field must be a valid date."));
            None
        }
    }
}

pub fn check_before_today(
    errors: &mut FieldErrors,
    field: &str,
    date: NaiveDate,
    today: NaiveDate,
) {
    if date >= today {
        errors.add(
            field,
            format!("The {field} field must be a date before today."),
        );
    }
}
