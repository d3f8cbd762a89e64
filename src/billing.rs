//! Bills: line items snapshotted from the treatment catalogue, an optional
//! package discount and a per-centre sequential display number.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::*;
use crate::validation::{ValidationError, Validator};

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Bill not found: {0}")]
    NotFound(Uuid),
    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("Package sale not found: {0}")]
    SaleNotFound(Uuid),
    #[error("Bill is {0} and can no longer change")]
    Immutable(BillStatus),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for BillingError {
    fn from(err: rusqlite::Error) -> Self {
        BillingError::Database(DatabaseError::Sqlite(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillTotals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub grand_total_cents: i64,
}

/// Subtotal, discount (rounded half up to the cent) and grand total.
/// The percentage is clamped to `0..=100`, so the total is never negative.
pub fn compute_totals(items: &[BillLineItem], discount_percent: f64) -> BillTotals {
    let subtotal: i64 = items.iter().map(|i| i.price_cents).sum();
    let pct = if discount_percent.is_finite() {
        discount_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    // hundredths of a percent keep the rounding in integers
    let basis_points = (pct * 100.0).round() as i64;
    let discount = (subtotal.max(0) * basis_points + 5_000) / 10_000;
    BillTotals {
        subtotal_cents: subtotal,
        discount_cents: discount,
        grand_total_cents: (subtotal - discount).max(0),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBillRequest {
    pub patient_id: Uuid,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Repeated ids bill the treatment more than once.
    pub treatment_ids: Vec<Uuid>,
    /// Defaults to the session's package sale.
    #[serde(default)]
    pub package_sale_id: Option<Uuid>,
}

pub fn create_bill(
    conn: &Connection,
    centre_id: &Uuid,
    req: CreateBillRequest,
) -> Result<Bill, BillingError> {
    repository::get_patient(conn, centre_id, &req.patient_id)?
        .ok_or(BillingError::PatientNotFound(req.patient_id))?;

    let mut sale_id = req.package_sale_id;
    if let Some(session_id) = req.session_id {
        let session = repository::get_session(conn, centre_id, &session_id)?
            .ok_or(BillingError::SessionNotFound(session_id))?;
        if session.patient_id != req.patient_id {
            return Err(ValidationError::single("session_id", "belongs to another patient").into());
        }
        sale_id = sale_id.or(session.package_sale_id);
    }

    let mut v = Validator::new();
    v.check("treatment_ids", !req.treatment_ids.is_empty(), "at least one treatment is required");
    let mut items = Vec::with_capacity(req.treatment_ids.len());
    for (i, id) in req.treatment_ids.iter().enumerate() {
        let field = format!("treatment_ids[{i}]");
        match repository::get_treatment(conn, centre_id, id)? {
            Some(t) if t.active => items.push(BillLineItem {
                id: Uuid::new_v4(),
                treatment_id: Some(t.id),
                name: t.name,
                price_cents: t.price_cents,
                position: i as u32,
            }),
            Some(_) => {
                v.check(&field, false, "treatment is no longer offered");
            }
            None => {
                v.check(&field, false, "unknown treatment");
            }
        }
    }
    v.finish()?;

    let discount_percent = match sale_id {
        Some(id) => sale_discount(conn, centre_id, &req.patient_id, &id)?,
        None => 0.0,
    };
    let totals = compute_totals(&items, discount_percent);

    let tx = conn.unchecked_transaction()?;
    let bill = Bill {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        display_number: repository::next_display_number(&tx, centre_id)?,
        patient_id: req.patient_id,
        session_id: req.session_id,
        package_sale_id: sale_id,
        items,
        subtotal_cents: totals.subtotal_cents,
        discount_percent,
        discount_cents: totals.discount_cents,
        grand_total_cents: totals.grand_total_cents,
        status: BillStatus::Unpaid,
        created_at: now_timestamp(),
        paid_at: None,
    };
    repository::insert_bill(&tx, &bill)?;
    tx.commit()?;

    tracing::info!(
        bill_id = %bill.id,
        display_number = bill.display_number,
        grand_total_cents = bill.grand_total_cents,
        "Bill created"
    );
    Ok(bill)
}

/// The package discount applies to the patient's own sale while it is active
/// or completed; an expired sale gives none. The last session of a package
/// completes the sale before it is billed.
fn sale_discount(
    conn: &Connection,
    centre_id: &Uuid,
    patient_id: &Uuid,
    sale_id: &Uuid,
) -> Result<f64, BillingError> {
    let sale = repository::get_package_sale(conn, centre_id, sale_id)?
        .ok_or(BillingError::SaleNotFound(*sale_id))?;
    if &sale.patient_id != patient_id || sale.status == PackageSaleStatus::Expired {
        return Ok(0.0);
    }
    Ok(repository::get_package(conn, centre_id, &sale.package_id)?
        .map(|p| p.discount_percent)
        .unwrap_or(0.0))
}

pub fn get_bill(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Bill, BillingError> {
    repository::get_bill(conn, centre_id, id)?.ok_or(BillingError::NotFound(*id))
}

pub fn list_bills(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &BillFilter,
) -> Result<Vec<Bill>, BillingError> {
    Ok(repository::list_bills(conn, centre_id, filter)?)
}

pub fn mark_paid(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Bill, BillingError> {
    let mut bill = get_bill(conn, centre_id, id)?;
    if bill.status != BillStatus::Unpaid {
        return Err(BillingError::Immutable(bill.status));
    }
    let paid_at = now_timestamp();
    repository::update_bill_status(conn, centre_id, id, BillStatus::Paid, Some(paid_at))?;
    bill.status = BillStatus::Paid;
    bill.paid_at = Some(paid_at);
    tracing::info!(bill_id = %id, "Bill paid");
    Ok(bill)
}

pub fn void_bill(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Bill, BillingError> {
    let mut bill = get_bill(conn, centre_id, id)?;
    if bill.status != BillStatus::Unpaid {
        return Err(BillingError::Immutable(bill.status));
    }
    repository::update_bill_status(conn, centre_id, id, BillStatus::Void, None)?;
    bill.status = BillStatus::Void;
    tracing::info!(bill_id = %id, "Bill voided");
    Ok(bill)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub paid_count: i64,
    pub paid_total_cents: i64,
    pub unpaid_count: i64,
    pub unpaid_total_cents: i64,
}

/// Paid revenue by payment date and outstanding bills by creation date,
/// both over `[from, to]` inclusive.
pub fn revenue_summary(
    conn: &Connection,
    centre_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<RevenueSummary, BillingError> {
    if to < from {
        return Err(ValidationError::single("to", "must not be before from").into());
    }
    let (paid_count, paid_total_cents) =
        repository::sum_bills(conn, centre_id, BillStatus::Paid, Some((from, to)))?;
    let (unpaid_count, unpaid_total_cents) =
        repository::sum_bills(conn, centre_id, BillStatus::Unpaid, Some((from, to)))?;
    Ok(RevenueSummary {
        from,
        to,
        paid_count,
        paid_total_cents,
        unpaid_count,
        unpaid_total_cents,
    })
}
