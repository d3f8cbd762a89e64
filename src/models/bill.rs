use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::BillStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillLineItem {
    pub id: Uuid,
    pub treatment_id: Option<Uuid>,
    pub name: String,
    pub price_cents: i64,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub centre_id: Uuid,
    /// Sequential per centre, starting at 1.
    pub display_number: i64,
    pub patient_id: Uuid,
    pub session_id: Option<Uuid>,
    pub package_sale_id: Option<Uuid>,
    pub items: Vec<BillLineItem>,
    pub subtotal_cents: i64,
    pub discount_percent: f64,
    pub discount_cents: i64,
    pub grand_total_cents: i64,
    pub status: BillStatus,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}
