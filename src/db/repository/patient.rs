use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, parse_datetime, parse_opt_date, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, centre_id, name, phone, email, date_of_birth, gender, address,
     medical_notes, active_package_sale_id, created_at, updated_at";

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, centre_id, name, phone, email, date_of_birth, gender, address,
         medical_notes, active_package_sale_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            patient.id.to_string(),
            patient.centre_id.to_string(),
            patient.name,
            patient.phone,
            patient.email,
            patient.date_of_birth.as_ref().map(fmt_date),
            patient.gender,
            patient.address,
            patient.medical_notes,
            patient.active_package_sale_id.map(|id| id.to_string()),
            fmt_datetime(&patient.created_at),
            fmt_datetime(&patient.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            patient_row_from_rusqlite,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

/// Lists patients by name, optionally narrowed by a substring over name, phone and e-mail.
pub fn list_patients(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &PatientFilter,
) -> Result<Vec<Patient>, DatabaseError> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));
    let limit = filter.limit.map(i64::from).unwrap_or(-1);
    let offset = filter.offset.map(i64::from).unwrap_or(0);

    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE centre_id = ?1
           AND (?2 IS NULL
                OR LOWER(name) LIKE LOWER(?2)
                OR phone LIKE ?2
                OR LOWER(email) LIKE LOWER(?2))
         ORDER BY name COLLATE NOCASE ASC
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![centre_id.to_string(), pattern, limit, offset],
        patient_row_from_rusqlite,
    )?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

/// Updates demographic and note fields. The package-sale link is managed separately.
pub fn update_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET name = ?1, phone = ?2, email = ?3, date_of_birth = ?4, gender = ?5,
         address = ?6, medical_notes = ?7, updated_at = ?8
         WHERE id = ?9 AND centre_id = ?10",
        params![
            patient.name,
            patient.phone,
            patient.email,
            patient.date_of_birth.as_ref().map(fmt_date),
            patient.gender,
            patient.address,
            patient.medical_notes,
            fmt_datetime(&patient.updated_at),
            patient.id.to_string(),
            patient.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Patient", patient.id));
    }
    Ok(())
}

pub fn set_active_package_sale(
    conn: &Connection,
    centre_id: &Uuid,
    patient_id: &Uuid,
    sale_id: Option<&Uuid>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET active_package_sale_id = ?1 WHERE id = ?2 AND centre_id = ?3",
        params![
            sale_id.map(|id| id.to_string()),
            patient_id.to_string(),
            centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Patient", patient_id));
    }
    Ok(())
}

/// Clears the link only if it still points at `sale_id`.
pub fn clear_active_package_sale_if(
    conn: &Connection,
    centre_id: &Uuid,
    patient_id: &Uuid,
    sale_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE patients SET active_package_sale_id = NULL
         WHERE id = ?1 AND centre_id = ?2 AND active_package_sale_id = ?3",
        params![patient_id.to_string(), centre_id.to_string(), sale_id.to_string()],
    )?;
    Ok(())
}

pub fn delete_patient(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM patients WHERE id = ?1 AND centre_id = ?2",
        params![id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Patient", id));
    }
    Ok(())
}

pub fn count_patients(conn: &Connection, centre_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE centre_id = ?1",
        params![centre_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Whether any session, package sale or bill references the patient.
pub fn patient_has_history(conn: &Connection, patient_id: &Uuid) -> Result<bool, DatabaseError> {
    let found: i64 = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sessions WHERE patient_id = ?1)
             OR EXISTS (SELECT 1 FROM package_sales WHERE patient_id = ?1)
             OR EXISTS (SELECT 1 FROM bills WHERE patient_id = ?1)",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(found != 0)
}

struct PatientRow {
    id: String,
    centre_id: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    date_of_birth: Option<String>,
    gender: Option<String>,
    address: Option<String>,
    medical_notes: Option<String>,
    active_package_sale_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn patient_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PatientRow, rusqlite::Error> {
    Ok(PatientRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        date_of_birth: row.get(5)?,
        gender: row.get(6)?,
        address: row.get(7)?,
        medical_notes: row.get(8)?,
        active_package_sale_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        name: row.name,
        phone: row.phone,
        email: row.email,
        date_of_birth: parse_opt_date(row.date_of_birth)?,
        gender: row.gender,
        address: row.address,
        medical_notes: row.medical_notes,
        active_package_sale_id: parse_opt_uuid(row.active_package_sale_id)?,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
