use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use uuid::Uuid;

use super::enums::{BillStatus, PackageSaleStatus, SessionStatus};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PatientFilter {
    /// Case-insensitive substring over name, phone and e-mail.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SessionFilter {
    /// Sessions starting at or after this instant.
    pub from: Option<NaiveDateTime>,
    /// Sessions starting before this instant.
    pub to: Option<NaiveDateTime>,
    pub therapist_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    pub package_sale_id: Option<Uuid>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PackageSaleFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<PackageSaleStatus>,
    /// Sales expiring on or before this date.
    pub expires_before: Option<NaiveDate>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BillFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<BillStatus>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
}
