//! Repository layer — entity-scoped database operations.
//!
//! Every tenant-owned query is filtered by `centre_id`; a row owned by
//! another centre is indistinguishable from a missing row. All public
//! functions are re-exported here.

mod audit;
mod bill;
mod catalogue;
mod centre;
mod package_sale;
mod patient;
mod session;
mod template;
mod therapist;

#[cfg(test)]
pub(crate) mod test_support;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::ErrorCode;
use uuid::Uuid;

use super::{DatabaseError, DATETIME_FORMAT, DATE_FORMAT};

pub use audit::*;
pub use bill::*;
pub use catalogue::*;
pub use centre::*;
pub use package_sale::*;
pub use patient::*;
pub use session::*;
pub use template::*;
pub use therapist::*;

/// Current centre-local time truncated to whole seconds (storage precision).
pub fn now_timestamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid id '{s}': {e}")))
}

pub(crate) fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    s.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid date-time '{s}': {e}")))
}

pub(crate) fn parse_opt_datetime(s: Option<String>) -> Result<Option<NaiveDateTime>, DatabaseError> {
    s.as_deref().map(parse_datetime).transpose()
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid date '{s}': {e}")))
}

pub(crate) fn parse_opt_date(s: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    s.as_deref().map(parse_date).transpose()
}

/// Turn a UNIQUE violation into a readable `ConstraintViolation`.
pub(crate) fn map_unique_violation(err: rusqlite::Error, message: &str) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            DatabaseError::ConstraintViolation(message.to_string())
        }
        _ => DatabaseError::Sqlite(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trips_through_storage_format() {
        let now = now_timestamp();
        assert_eq!(parse_datetime(&fmt_datetime(&now)).unwrap(), now);
    }

    #[test]
    fn invalid_uuid_is_constraint_violation() {
        let err = parse_uuid("not-a-uuid").unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn optional_helpers_pass_through_none() {
        assert!(parse_opt_uuid(None).unwrap().is_none());
        assert!(parse_opt_date(None).unwrap().is_none());
        assert!(parse_opt_datetime(None).unwrap().is_none());
    }
}
