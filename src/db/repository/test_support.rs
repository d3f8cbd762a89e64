//! Seed helpers shared by repository and service tests.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rusqlite::Connection;
use uuid::Uuid;

use super::*;
use crate::models::*;

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, crate::db::DATETIME_FORMAT).expect("seed date-time")
}

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, crate::db::DATE_FORMAT).expect("seed date")
}

pub fn seed_centre(conn: &Connection, name: &str) -> Uuid {
    let centre = Centre {
        id: Uuid::new_v4(),
        name: name.into(),
        created_at: now_timestamp(),
    };
    insert_centre(conn, &centre).expect("seed centre");
    centre.id
}

/// The stored hash is a placeholder; auth tests hash real passwords themselves.
pub fn seed_user(conn: &Connection, centre_id: &Uuid, email: &str, role: Role) -> Uuid {
    let user = User {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: email.split('@').next().unwrap_or(email).into(),
        email: email.into(),
        role,
        password_hash: "pbkdf2-sha256$1$AAAA$AAAA".into(),
        created_at: now_timestamp(),
    };
    insert_user(conn, &user).expect("seed user");
    user.id
}

/// E-mail is derived from the name: "Maria Lopez" -> "maria.lopez@example.test".
pub fn seed_patient(conn: &Connection, centre_id: &Uuid, name: &str) -> Uuid {
    let now = now_timestamp();
    let local = name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(".");
    let patient = Patient {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: name.into(),
        phone: Some("+44 20 7946 0000".into()),
        email: Some(format!("{local}@example.test")),
        date_of_birth: None,
        gender: None,
        address: None,
        medical_notes: None,
        active_package_sale_id: None,
        created_at: now,
        updated_at: now,
    };
    insert_patient(conn, &patient).expect("seed patient");
    patient.id
}

/// Monday to Friday, 08:00 to 18:00.
pub fn seed_therapist(conn: &Connection, centre_id: &Uuid, name: &str) -> Uuid {
    let start = NaiveTime::from_hms_opt(8, 0, 0).expect("time");
    let end = NaiveTime::from_hms_opt(18, 0, 0).expect("time");
    let working_hours = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
        .into_iter()
        .map(|weekday| WorkingHours { weekday, start, end })
        .collect();
    let therapist = Therapist {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: name.into(),
        user_id: None,
        working_hours,
        active: true,
        created_at: now_timestamp(),
    };
    insert_therapist(conn, &therapist).expect("seed therapist");
    therapist.id
}

pub fn seed_treatment(conn: &Connection, centre_id: &Uuid, name: &str, price_cents: i64) -> Uuid {
    let treatment = Treatment {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: name.into(),
        price_cents,
        duration_minutes: 45,
        active: true,
        created_at: now_timestamp(),
    };
    insert_treatment(conn, &treatment).expect("seed treatment");
    treatment.id
}

/// 45-minute sessions, weekly, valid for 90 days.
pub fn seed_package(
    conn: &Connection,
    centre_id: &Uuid,
    name: &str,
    session_count: u32,
    price_cents: i64,
    discount_percent: f64,
) -> Uuid {
    let package = PackageDef {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        name: name.into(),
        session_count,
        session_duration_minutes: 45,
        price_cents,
        discount_percent,
        interval_days: 7,
        validity_days: 90,
        active: true,
        created_at: now_timestamp(),
    };
    insert_package(conn, &package).expect("seed package");
    package.id
}

/// An active sale with no sessions used and no generated sessions.
pub fn seed_package_sale(
    conn: &Connection,
    centre_id: &Uuid,
    patient_id: &Uuid,
    package_id: &Uuid,
    sessions_total: u32,
    start_date: &str,
    expires_on: &str,
) -> Uuid {
    let sale = PackageSale {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        patient_id: *patient_id,
        package_id: *package_id,
        sessions_total,
        sessions_used: 0,
        sessions_remaining: sessions_total,
        price_cents: 0,
        start_date: day(start_date),
        expires_on: day(expires_on),
        status: PackageSaleStatus::Active,
        created_at: now_timestamp(),
    };
    insert_package_sale(conn, &sale).expect("seed package sale");
    sale.id
}

pub fn seed_session(
    conn: &Connection,
    centre_id: &Uuid,
    patient_id: &Uuid,
    therapist_id: &Uuid,
    start: &str,
    minutes: i64,
    status: SessionStatus,
) -> Uuid {
    let start_at = ts(start);
    let now = now_timestamp();
    let session = Session {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        patient_id: *patient_id,
        therapist_id: *therapist_id,
        start_at,
        end_at: start_at + Duration::minutes(minutes),
        status,
        package_sale_id: None,
        treatment_id: None,
        notes: None,
        template_id: None,
        answers: None,
        created_at: now,
        updated_at: now,
    };
    insert_session(conn, &session).expect("seed session");
    session.id
}

/// An unpaid single-item bill with no discount and the next display number.
pub fn seed_bill(
    conn: &Connection,
    centre_id: &Uuid,
    patient_id: &Uuid,
    amount_cents: i64,
    created_at: &str,
) -> Uuid {
    let bill = Bill {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        display_number: next_display_number(conn, centre_id).expect("display number"),
        patient_id: *patient_id,
        session_id: None,
        package_sale_id: None,
        items: vec![BillLineItem {
            id: Uuid::new_v4(),
            treatment_id: None,
            name: "Consultation".into(),
            price_cents: amount_cents,
            position: 0,
        }],
        subtotal_cents: amount_cents,
        discount_percent: 0.0,
        discount_cents: 0,
        grand_total_cents: amount_cents,
        status: BillStatus::Unpaid,
        created_at: ts(created_at),
        paid_at: None,
    };
    insert_bill(conn, &bill).expect("seed bill");
    bill.id
}
