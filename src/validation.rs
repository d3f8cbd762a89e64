//! Input validation shared by every entity form.
//!
//! A `Validator` accumulates field errors so a single response can list
//! everything that is wrong with a submission.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap()
});

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()\-]+$").unwrap());

/// Shortest and longest digit count accepted for a phone number.
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 7..=15;

/// Upper bound for free-text names.
pub const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid input: {}", join_errors(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value.trim())
}

pub fn is_valid_phone(value: &str) -> bool {
    let value = value.trim();
    if !PHONE_PATTERN.is_match(value) {
        return false;
    }
    let digits = value.chars().filter(char::is_ascii_digit).count();
    PHONE_DIGITS.contains(&digits)
}

/// Accumulates field errors.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field: field.into(),
                message: message.into(),
            });
        }
        self
    }

    /// Non-blank and at most `MAX_NAME_LEN` characters.
    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return self.check(field, false, "is required");
        }
        self.check(
            field,
            trimmed.chars().count() <= MAX_NAME_LEN,
            "is too long",
        )
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(field, is_valid_email(value), "is not a valid e-mail address")
    }

    /// Blank optional values are accepted.
    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.email(field, v),
            None => self,
        }
    }

    pub fn optional_phone(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.check(field, is_valid_phone(v), "is not a valid phone number"),
            None => self,
        }
    }

    pub fn money(&mut self, field: &str, cents: i64) -> &mut Self {
        self.check(field, cents >= 0, "must not be negative")
    }

    pub fn percent(&mut self, field: &str, value: f64) -> &mut Self {
        self.check(
            field,
            value.is_finite() && (0.0..=100.0).contains(&value),
            "must be between 0 and 100",
        )
    }

    pub fn positive(&mut self, field: &str, value: i64) -> &mut Self {
        self.check(field, value > 0, "must be greater than zero")
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: std::mem::take(&mut self.errors),
            })
        }
    }
}

/// Trim an optional text input, mapping blanks to `None`.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("anna@clinic.test"));
        assert!(is_valid_email("  j.smith+physio@mail.example.co.uk "));
        assert!(!is_valid_email("anna@"));
        assert!(!is_valid_email("anna.clinic.test"));
        assert!(!is_valid_email("anna@clinic"));
    }

    #[test]
    fn phone_shapes() {
        assert!(is_valid_phone("+44 20 7946 0000"));
        assert!(is_valid_phone("(555) 123-4567"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("call me"));
    }

    #[test]
    fn collects_every_failing_field() {
        let err = Validator::new()
            .required("name", "   ")
            .optional_email("email", Some("nope"))
            .money("price_cents", -1)
            .percent("discount_percent", 120.0)
            .finish()
            .unwrap_err();
        assert_eq!(err.errors.len(), 4);
        assert!(err.has_field("name"));
        assert!(err.has_field("discount_percent"));
        assert!(err.to_string().contains("price_cents: must not be negative"));
    }

    #[test]
    fn blank_optionals_pass() {
        Validator::new()
            .required("name", "Maria")
            .optional_email("email", Some(""))
            .optional_phone("phone", None)
            .percent("discount_percent", 0.0)
            .finish()
            .unwrap();
    }

    #[test]
    fn clean_optional_drops_blank() {
        assert_eq!(clean_optional(Some("  ".into())), None);
        assert_eq!(clean_optional(Some(" x ".into())), Some("x".into()));
    }
}
