//! Weekly abnormal-readings alerts.
//!
//! Per patient-week: `NoAlert → Evaluating → Skipped(reason) | Created`.
//!
//! Dedup is enforced by the storage layer: `alerts` carries
//! `UNIQUE(patient_id, week_start)` and the insert is `ON CONFLICT DO NOTHING`.
//! Two evaluations that both pass the "no alert yet" check race on the insert;
//! the loser sees zero affected rows and reports `AlreadySentThisWeek`.
//! Weeks start Monday 00:00 UTC.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MonitorError;
use super::notify::{AbnormalReadingLine, DispatchRequest, NotificationDispatcher};
use crate::config::MonitorConfig;
use crate::db::repository::{
    count_readings_in_window, get_alert_for_week, get_current_specialist, get_patient,
    get_readings_in_window, insert_alert_if_absent, mark_specialist_delivered,
};
use crate::db::DatabaseError;
use crate::models::{
    Alert, Category, NotificationKind, Patient, Reading, Recipient, RecipientRole, Specialist,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ThresholdNotMet,
    AlreadySentThisWeek,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ThresholdNotMet => "threshold_not_met",
            SkipReason::AlreadySentThisWeek => "already_sent_this_week",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AlertOutcome {
    Skipped(SkipReason),
    Created(Alert),
}

/// Result of the read-only half of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Skip(SkipReason),
    Raise {
        abnormal_count: u32,
        week_start: NaiveDate,
    },
}

/// Monday of the UTC calendar week containing `now`.
pub fn week_start(now: NaiveDateTime) -> NaiveDate {
    let date = now.date();
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub struct AlertEngine {
    config: MonitorConfig,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AlertEngine {
    pub fn new(config: MonitorConfig, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    pub fn evaluate(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<AlertOutcome, MonitorError> {
        self.evaluate_at(conn, patient_id, Utc::now().naive_utc())
    }

    pub fn evaluate_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: NaiveDateTime,
    ) -> Result<AlertOutcome, MonitorError> {
        match self.assess_at(conn, patient_id, now)? {
            Assessment::Skip(reason) => {
                tracing::debug!(patient_id = %patient_id, reason = reason.as_str(), "Alert skipped");
                Ok(AlertOutcome::Skipped(reason))
            }
            Assessment::Raise {
                abnormal_count,
                week_start,
            } => self.raise(conn, patient_id, abnormal_count, week_start, now),
        }
    }

    /// Count the trailing window and check for an existing alert this week.
    pub fn assess_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: NaiveDateTime,
    ) -> Result<Assessment, MonitorError> {
        let from = now - Duration::days(self.config.alert_window_days);
        let abnormal_count =
            count_readings_in_window(conn, patient_id, Category::Abnormal, &from, &now)?;

        if abnormal_count <= self.config.alert_trigger_count {
            return Ok(Assessment::Skip(SkipReason::ThresholdNotMet));
        }

        let week_start = week_start(now);
        if get_alert_for_week(conn, patient_id, &week_start)?.is_some() {
            return Ok(Assessment::Skip(SkipReason::AlreadySentThisWeek));
        }

        Ok(Assessment::Raise {
            abnormal_count,
            week_start,
        })
    }

    /// Persist the alert and notify its recipients.
    ///
    /// Losing the insert race yields `Skipped(AlreadySentThisWeek)`. Failures
    /// after the insert (specialist lookup, readings table, delivery) are
    /// logged and leave the alert in place.
    pub fn raise(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        abnormal_count: u32,
        week_start: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<AlertOutcome, MonitorError> {
        let patient = get_patient(conn, patient_id)?.ok_or_else(|| DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: patient_id.to_string(),
        })?;

        let specialist = match get_current_specialist(conn, patient_id) {
            Ok(specialist) => specialist,
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "Specialist lookup failed, alerting patient only");
                None
            }
        };

        let mut alert = Alert {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            week_start,
            abnormal_count,
            recipients: build_recipients(&patient, specialist.as_ref()),
            sent_at: now,
            specialist_delivered_at: None,
        };

        if !insert_alert_if_absent(conn, &alert)? {
            tracing::info!(
                patient_id = %patient_id,
                week_start = %week_start,
                "Concurrent evaluation already raised this week's alert"
            );
            return Ok(AlertOutcome::Skipped(SkipReason::AlreadySentThisWeek));
        }

        tracing::info!(
            alert_id = %alert.id,
            patient_id = %patient_id,
            abnormal_count,
            week_start = %week_start,
            recipients = alert.recipients.len(),
            "Weekly alert created"
        );

        let from = now - Duration::days(self.config.alert_window_days);
        let readings =
            match get_readings_in_window(conn, patient_id, Category::Abnormal, &from, &now) {
                Ok(readings) => readings,
                Err(e) => {
                    tracing::warn!(alert_id = %alert.id, error = %e, "Could not load readings for notification");
                    Vec::new()
                }
            };

        let mut specialist_reached = None;
        for recipient in &alert.recipients {
            let request = build_request(&alert, &patient.name, recipient, &readings);
            match self.dispatcher.dispatch(&request) {
                Ok(()) if recipient.role == RecipientRole::Specialist => {
                    specialist_reached = Some(recipient.user_id);
                }
                Ok(()) => {}
                Err(e) => tracing::warn!(
                    alert_id = %alert.id,
                    recipient = %recipient.user_id,
                    error = %e,
                    "Alert notification failed"
                ),
            }
        }

        // A specialist reached now must not get the alert again on reconnect.
        if let Some(specialist_id) = specialist_reached {
            match mark_specialist_delivered(conn, &alert.id, &specialist_id, &now) {
                Ok(true) => alert.specialist_delivered_at = Some(now),
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    alert_id = %alert.id,
                    error = %e,
                    "Could not record specialist delivery, alert stays pending"
                ),
            }
        }

        Ok(AlertOutcome::Created(alert))
    }
}

fn build_recipients(patient: &Patient, specialist: Option<&Specialist>) -> Vec<Recipient> {
    let mut recipients = vec![Recipient {
        user_id: patient.id,
        role: RecipientRole::Patient,
        name: patient.name.clone(),
        email: patient.email.clone(),
    }];
    if let Some(s) = specialist {
        recipients.push(Recipient {
            user_id: s.id,
            role: RecipientRole::Specialist,
            name: s.name.clone(),
            email: s.email.clone(),
        });
    }
    recipients
}

/// Human-readable alert summary for one audience.
pub(crate) fn alert_summary(
    kind: NotificationKind,
    patient_name: &str,
    abnormal_count: u32,
    week_start: NaiveDate,
) -> String {
    match kind {
        NotificationKind::PatientAlert => format!(
            "You have recorded {abnormal_count} abnormal readings in the past 7 days. \
             Please review them below and consider contacting your care team."
        ),
        NotificationKind::SpecialistAlert => format!(
            "{patient_name} recorded {abnormal_count} abnormal readings in the past 7 days \
             (week of {}).",
            week_start.format("%Y-%m-%d")
        ),
    }
}

pub(crate) fn build_request(
    alert: &Alert,
    patient_name: &str,
    recipient: &Recipient,
    readings: &[Reading],
) -> DispatchRequest {
    let kind = match recipient.role {
        RecipientRole::Patient => NotificationKind::PatientAlert,
        RecipientRole::Specialist => NotificationKind::SpecialistAlert,
    };
    DispatchRequest {
        alert_id: alert.id,
        recipient_user_id: recipient.user_id,
        recipient_email: recipient.email.clone(),
        kind,
        summary: alert_summary(kind, patient_name, alert.abnormal_count, alert.week_start),
        abnormal_readings: readings.iter().map(AbnormalReadingLine::from).collect(),
        abnormal_count: alert.abnormal_count,
    }
}
