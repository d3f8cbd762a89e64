//! Treatment and package definitions.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::*;
use crate::validation::{ValidationError, Validator};

pub const DEFAULT_INTERVAL_DAYS: u32 = 7;
pub const DEFAULT_VALIDITY_DAYS: u32 = 90;

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("Treatment not found: {0}")]
    TreatmentNotFound(Uuid),
    #[error("Package not found: {0}")]
    PackageNotFound(Uuid),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ─── Treatments ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TreatmentInput {
    pub name: String,
    pub price_cents: i64,
    pub duration_minutes: u32,
    #[serde(default)]
    pub active: Option<bool>,
}

fn validate_treatment(input: &TreatmentInput) -> Result<(), ValidationError> {
    Validator::new()
        .required("name", &input.name)
        .money("price_cents", input.price_cents)
        .positive("duration_minutes", i64::from(input.duration_minutes))
        .finish()
}

pub fn create_treatment(
    conn: &Connection,
    centre_id: &Uuid,
    input: TreatmentInput,
) -> Result<Treatment, CatalogueError> {
    validate_treatment(&input)?;
    let treatment = Treatment {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: input.name.trim().to_string(),
        price_cents: input.price_cents,
        duration_minutes: input.duration_minutes,
        active: input.active.unwrap_or(true),
        created_at: now_timestamp(),
    };
    repository::insert_treatment(conn, &treatment)?;
    Ok(treatment)
}

pub fn get_treatment(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Treatment, CatalogueError> {
    repository::get_treatment(conn, centre_id, id)?.ok_or(CatalogueError::TreatmentNotFound(*id))
}

pub fn list_treatments(
    conn: &Connection,
    centre_id: &Uuid,
    active_only: bool,
) -> Result<Vec<Treatment>, CatalogueError> {
    Ok(repository::list_treatments(conn, centre_id, active_only)?)
}

pub fn update_treatment(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    input: TreatmentInput,
) -> Result<Treatment, CatalogueError> {
    validate_treatment(&input)?;
    let mut treatment = get_treatment(conn, centre_id, id)?;
    treatment.name = input.name.trim().to_string();
    treatment.price_cents = input.price_cents;
    treatment.duration_minutes = input.duration_minutes;
    if let Some(active) = input.active {
        treatment.active = active;
    }
    repository::update_treatment(conn, &treatment)?;
    Ok(treatment)
}

/// Bills keep their snapshot, so deleting a treatment only retires it.
pub fn delete_treatment(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), CatalogueError> {
    repository::deactivate_treatment(conn, centre_id, id).map_err(|e| match e {
        DatabaseError::NotFound { .. } => CatalogueError::TreatmentNotFound(*id),
        other => other.into(),
    })
}

// ─── Packages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PackageInput {
    pub name: String,
    pub session_count: u32,
    pub session_duration_minutes: u32,
    pub price_cents: i64,
    #[serde(default)]
    pub discount_percent: f64,
    #[serde(default)]
    pub interval_days: Option<u32>,
    #[serde(default)]
    pub validity_days: Option<u32>,
    #[serde(default)]
    pub active: Option<bool>,
}

fn validate_package(input: &PackageInput, interval_days: u32, validity_days: u32) -> Result<(), ValidationError> {
    let span_days = i64::from(input.session_count.saturating_sub(1)) * i64::from(interval_days);
    Validator::new()
        .required("name", &input.name)
        .positive("session_count", i64::from(input.session_count))
        .positive("session_duration_minutes", i64::from(input.session_duration_minutes))
        .money("price_cents", input.price_cents)
        .percent("discount_percent", input.discount_percent)
        .positive("interval_days", i64::from(interval_days))
        .positive("validity_days", i64::from(validity_days))
        .check(
            "validity_days",
            validity_days == 0 || span_days < i64::from(validity_days),
            "is too short to fit every session",
        )
        .finish()
}

pub fn create_package(
    conn: &Connection,
    centre_id: &Uuid,
    input: PackageInput,
) -> Result<PackageDef, CatalogueError> {
    let interval_days = input.interval_days.unwrap_or(DEFAULT_INTERVAL_DAYS);
    let validity_days = input.validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS);
    validate_package(&input, interval_days, validity_days)?;

    let package = PackageDef {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: input.name.trim().to_string(),
        session_count: input.session_count,
        session_duration_minutes: input.session_duration_minutes,
        price_cents: input.price_cents,
        discount_percent: input.discount_percent,
        interval_days,
        validity_days,
        active: input.active.unwrap_or(true),
        created_at: now_timestamp(),
    };
    repository::insert_package(conn, &package)?;
    Ok(package)
}

pub fn get_package(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<PackageDef, CatalogueError> {
    repository::get_package(conn, centre_id, id)?.ok_or(CatalogueError::PackageNotFound(*id))
}

pub fn list_packages(
    conn: &Connection,
    centre_id: &Uuid,
    active_only: bool,
) -> Result<Vec<PackageDef>, CatalogueError> {
    Ok(repository::list_packages(conn, centre_id, active_only)?)
}

/// Existing sales keep the terms they were sold with.
pub fn update_package(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    input: PackageInput,
) -> Result<PackageDef, CatalogueError> {
    let mut package = get_package(conn, centre_id, id)?;
    let interval_days = input.interval_days.unwrap_or(package.interval_days);
    let validity_days = input.validity_days.unwrap_or(package.validity_days);
    validate_package(&input, interval_days, validity_days)?;

    package.name = input.name.trim().to_string();
    package.session_count = input.session_count;
    package.session_duration_minutes = input.session_duration_minutes;
    package.price_cents = input.price_cents;
    package.discount_percent = input.discount_percent;
    package.interval_days = interval_days;
    package.validity_days = validity_days;
    if let Some(active) = input.active {
        package.active = active;
    }
    repository::update_package(conn, &package)?;
    Ok(package)
}

pub fn deactivate_package(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), CatalogueError> {
    repository::deactivate_package(conn, centre_id, id).map_err(|e| match e {
        DatabaseError::NotFound { .. } => CatalogueError::PackageNotFound(*id),
        other => other.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::seed_centre;
    use crate::db::sqlite::open_memory_database;

    fn package_input() -> PackageInput {
        PackageInput {
            name: "Back rehab x6".into(),
            session_count: 6,
            session_duration_minutes: 45,
            price_cents: 30000,
            discount_percent: 10.0,
            interval_days: None,
            validity_days: None,
            active: None,
        }
    }

    #[test]
    fn package_defaults_applied() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let p = create_package(&conn, &centre, package_input()).unwrap();
        assert_eq!(p.interval_days, DEFAULT_INTERVAL_DAYS);
        assert_eq!(p.validity_days, DEFAULT_VALIDITY_DAYS);
        assert!(p.active);
    }

    #[test]
    fn package_bounds_enforced() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let err = create_package(
            &conn,
            &centre,
            PackageInput {
                session_count: 0,
                session_duration_minutes: 0,
                price_cents: -5,
                discount_percent: 101.0,
                ..package_input()
            },
        )
        .unwrap_err();
        match err {
            CatalogueError::Validation(v) => {
                for f in ["session_count", "session_duration_minutes", "price_cents", "discount_percent"] {
                    assert!(v.has_field(f), "{f}");
                }
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn validity_must_cover_all_sessions() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        // 6 weekly sessions span 35 days
        let err = create_package(
            &conn,
            &centre,
            PackageInput { validity_days: Some(35), ..package_input() },
        )
        .unwrap_err();
        assert!(matches!(err, CatalogueError::Validation(ref v) if v.has_field("validity_days")));
        create_package(&conn, &centre, PackageInput { validity_days: Some(36), ..package_input() }).unwrap();
    }

    #[test]
    fn treatment_lifecycle() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let t = create_treatment(
            &conn,
            &centre,
            TreatmentInput { name: "Dry needling".into(), price_cents: 4500, duration_minutes: 30, active: None },
        )
        .unwrap();

        let updated = update_treatment(
            &conn,
            &centre,
            &t.id,
            TreatmentInput { name: "Dry needling".into(), price_cents: 5000, duration_minutes: 30, active: None },
        )
        .unwrap();
        assert_eq!(updated.price_cents, 5000);
        assert!(updated.active);

        delete_treatment(&conn, &centre, &t.id).unwrap();
        assert!(!get_treatment(&conn, &centre, &t.id).unwrap().active);
        assert!(matches!(
            delete_treatment(&conn, &centre, &Uuid::new_v4()),
            Err(CatalogueError::TreatmentNotFound(_))
        ));
    }
}
