use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A billable treatment definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub centre_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub duration_minutes: u32,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

/// A sellable bundle of therapy sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDef {
    pub id: Uuid,
    pub centre_id: Uuid,
    pub name: String,
    pub session_count: u32,
    pub session_duration_minutes: u32,
    pub price_cents: i64,
    /// Discount applied to bills linked to a sale of this package.
    pub discount_percent: f64,
    pub interval_days: u32,
    pub validity_days: u32,
    pub active: bool,
    pub created_at: NaiveDateTime,
}
