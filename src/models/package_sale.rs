use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PackageSaleStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSale {
    pub id: Uuid,
    pub centre_id: Uuid,
    pub patient_id: Uuid,
    pub package_id: Uuid,
    pub sessions_total: u32,
    pub sessions_used: u32,
    pub sessions_remaining: u32,
    pub price_cents: i64,
    pub start_date: NaiveDate,
    pub expires_on: NaiveDate,
    pub status: PackageSaleStatus,
    pub created_at: NaiveDateTime,
}
