//! Alert delivery to specialists who connect after the alert was raised.
//!
//! An alert is pending for a specialist while its patient is currently
//! assigned to them and `specialist_delivered_at` is null. Delivery is
//! at-least-once: dispatch happens before the alert is marked, so a failed
//! mark means the alert is delivered again on the next session.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alerts::build_request;
use super::error::MonitorError;
use super::notify::NotificationDispatcher;
use crate::config::MonitorConfig;
use crate::db::repository::{
    get_alert, get_patient, get_pending_alert_summaries, get_pending_specialist_alerts,
    get_readings_in_window, get_specialist, mark_specialist_delivered,
};
use crate::db::DatabaseError;
use crate::models::{Alert, AlertSummary, Category, Recipient, RecipientRole};

/// Counts from one `deliver_pending` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub pending: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct SpecialistDeliveryTracker {
    config: MonitorConfig,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl SpecialistDeliveryTracker {
    pub fn new(config: MonitorConfig, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Undelivered alerts for the specialist's current patients, oldest first.
    pub fn pending_for(
        &self,
        conn: &Connection,
        specialist_id: &Uuid,
    ) -> Result<Vec<Alert>, MonitorError> {
        Ok(get_pending_specialist_alerts(conn, specialist_id)?)
    }

    /// Same selection as `pending_for`, with patient names for display.
    pub fn get_pending_alerts(
        &self,
        conn: &Connection,
        specialist_id: &Uuid,
    ) -> Result<Vec<AlertSummary>, MonitorError> {
        Ok(get_pending_alert_summaries(conn, specialist_id)?)
    }

    pub fn mark_delivered(
        &self,
        conn: &Connection,
        alert_id: &Uuid,
        specialist_id: &Uuid,
    ) -> Result<bool, MonitorError> {
        self.mark_delivered_at(conn, alert_id, specialist_id, Utc::now().naive_utc())
    }

    /// Stamp the alert as delivered.
    ///
    /// `Ok(false)` means it was already delivered. Unknown alerts and alerts
    /// of patients assigned elsewhere are errors.
    pub fn mark_delivered_at(
        &self,
        conn: &Connection,
        alert_id: &Uuid,
        specialist_id: &Uuid,
        delivered_at: NaiveDateTime,
    ) -> Result<bool, MonitorError> {
        if mark_specialist_delivered(conn, alert_id, specialist_id, &delivered_at)? {
            tracing::debug!(alert_id = %alert_id, specialist_id = %specialist_id, "Alert marked delivered");
            return Ok(true);
        }

        match get_alert(conn, alert_id)? {
            None => Err(DatabaseError::NotFound {
                entity_type: "alert".into(),
                id: alert_id.to_string(),
            }
            .into()),
            Some(alert) if alert.specialist_delivered_at.is_some() => Ok(false),
            Some(_) => Err(MonitorError::NotAssigned {
                alert_id: *alert_id,
                specialist_id: *specialist_id,
            }),
        }
    }

    /// Session-start sequence: fetch pending, dispatch each, then mark each.
    ///
    /// A failed dispatch leaves the alert pending. Only the initial fetch is
    /// fatal.
    pub fn deliver_pending(
        &self,
        conn: &Connection,
        specialist_id: &Uuid,
    ) -> Result<DeliveryReport, MonitorError> {
        let specialist = get_specialist(conn, specialist_id)?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity_type: "specialist".into(),
                id: specialist_id.to_string(),
            }
        })?;
        let recipient = Recipient {
            user_id: specialist.id,
            role: RecipientRole::Specialist,
            name: specialist.name,
            email: specialist.email,
        };

        let pending = self.pending_for(conn, specialist_id)?;
        let mut report = DeliveryReport {
            pending: pending.len(),
            ..DeliveryReport::default()
        };

        for alert in &pending {
            match self.deliver_one(conn, alert, &recipient) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        alert_id = %alert.id,
                        specialist_id = %specialist_id,
                        error = %e,
                        "Queued alert not delivered"
                    );
                }
            }
        }

        tracing::info!(
            specialist_id = %specialist_id,
            pending = report.pending,
            delivered = report.delivered,
            failed = report.failed,
            "Specialist delivery pass complete"
        );
        Ok(report)
    }

    fn deliver_one(
        &self,
        conn: &Connection,
        alert: &Alert,
        recipient: &Recipient,
    ) -> Result<(), MonitorError> {
        let patient_name = get_patient(conn, &alert.patient_id)?
            .map(|p| p.name)
            .unwrap_or_default();
        let from = alert.sent_at - Duration::days(self.config.alert_window_days);
        let readings =
            get_readings_in_window(conn, &alert.patient_id, Category::Abnormal, &from, &alert.sent_at)?;

        let request = build_request(alert, &patient_name, recipient, &readings);
        self.dispatcher.dispatch(&request)?;

        self.mark_delivered(conn, &alert.id, &recipient.user_id)?;
        Ok(())
    }
}
