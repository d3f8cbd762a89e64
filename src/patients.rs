//! Patient registry: validated create/update, search, guarded delete and
//! the per-patient history view.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::*;
use crate::validation::{clean_optional, ValidationError, Validator};

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found: {0}")]
    NotFound(Uuid),
    #[error("Patient has sessions, package sales or bills and cannot be deleted")]
    HasHistory,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Create/update payload. Blank optional strings are stored as `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientInput {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
}

/// Everything recorded against one patient.
#[derive(Debug, Clone, Serialize)]
pub struct PatientHistory {
    pub patient: Patient,
    pub active_package_sale: Option<PackageSale>,
    pub package_sales: Vec<PackageSale>,
    pub sessions: Vec<Session>,
    pub bills: Vec<Bill>,
}

fn validate(input: &PatientInput, today: NaiveDate) -> Result<(), ValidationError> {
    Validator::new()
        .required("name", &input.name)
        .optional_phone("phone", input.phone.as_deref())
        .optional_email("email", input.email.as_deref())
        .check(
            "date_of_birth",
            input.date_of_birth.map_or(true, |dob| dob <= today),
            "cannot be in the future",
        )
        .finish()
}

pub fn create_patient(
    conn: &Connection,
    centre_id: &Uuid,
    input: PatientInput,
) -> Result<Patient, PatientError> {
    let now = now_timestamp();
    validate(&input, now.date())?;

    let patient = Patient {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: input.name.trim().to_string(),
        phone: clean_optional(input.phone),
        email: clean_optional(input.email),
        date_of_birth: input.date_of_birth,
        gender: clean_optional(input.gender),
        address: clean_optional(input.address),
        medical_notes: clean_optional(input.medical_notes),
        active_package_sale_id: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_patient(conn, &patient)?;
    tracing::info!(patient_id = %patient.id, "Patient registered");
    Ok(patient)
}

pub fn get_patient(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Patient, PatientError> {
    repository::get_patient(conn, centre_id, id)?.ok_or(PatientError::NotFound(*id))
}

/// Replaces every editable field. The active package-sale link is untouched.
pub fn update_patient(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    input: PatientInput,
) -> Result<Patient, PatientError> {
    let now = now_timestamp();
    validate(&input, now.date())?;

    let mut patient = get_patient(conn, centre_id, id)?;
    patient.name = input.name.trim().to_string();
    patient.phone = clean_optional(input.phone);
    patient.email = clean_optional(input.email);
    patient.date_of_birth = input.date_of_birth;
    patient.gender = clean_optional(input.gender);
    patient.address = clean_optional(input.address);
    patient.medical_notes = clean_optional(input.medical_notes);
    patient.updated_at = now;

    repository::update_patient(conn, &patient)?;
    Ok(patient)
}

pub fn search_patients(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &PatientFilter,
) -> Result<Vec<Patient>, PatientError> {
    Ok(repository::list_patients(conn, centre_id, filter)?)
}

pub fn delete_patient(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), PatientError> {
    get_patient(conn, centre_id, id)?;
    if repository::patient_has_history(conn, id)? {
        return Err(PatientError::HasHistory);
    }
    repository::delete_patient(conn, centre_id, id)?;
    tracing::info!(patient_id = %id, "Patient deleted");
    Ok(())
}

pub fn patient_history(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<PatientHistory, PatientError> {
    let patient = get_patient(conn, centre_id, id)?;

    let package_sales = repository::list_package_sales(
        conn,
        centre_id,
        &PackageSaleFilter {
            patient_id: Some(*id),
            ..Default::default()
        },
    )?;
    let active_package_sale = patient
        .active_package_sale_id
        .and_then(|sale_id| package_sales.iter().find(|s| s.id == sale_id).cloned());

    let sessions = repository::list_sessions(
        conn,
        centre_id,
        &SessionFilter {
            patient_id: Some(*id),
            ..Default::default()
        },
    )?;
    let bills = repository::list_bills(
        conn,
        centre_id,
        &BillFilter {
            patient_id: Some(*id),
            ..Default::default()
        },
    )?;

    Ok(PatientHistory {
        patient,
        active_package_sale,
        package_sales,
        sessions,
        bills,
    })
}
