use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SessionStatus;

/// Structured answers captured against a form template, keyed by field key.
pub type TemplateAnswers = BTreeMap<String, serde_json::Value>;

/// A single scheduled therapy visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub centre_id: Uuid,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: SessionStatus,
    pub package_sale_id: Option<Uuid>,
    pub treatment_id: Option<Uuid>,
    pub notes: Option<String>,
    pub template_id: Option<Uuid>,
    pub answers: Option<TemplateAnswers>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Session {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }
}
