use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RecipientRole;

/// Someone notified about an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub role: RecipientRole,
    pub name: String,
    pub email: Option<String>,
}

/// Weekly abnormal-readings alert. At most one per (patient, week_start).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub week_start: NaiveDate,
    pub abnormal_count: u32,
    pub recipients: Vec<Recipient>,
    pub sent_at: NaiveDateTime,
    pub specialist_delivered_at: Option<NaiveDateTime>,
}

/// What a reconnecting specialist sees for each queued alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSummary {
    pub alert_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub week_start: NaiveDate,
    pub abnormal_count: u32,
    pub sent_at: NaiveDateTime,
}
