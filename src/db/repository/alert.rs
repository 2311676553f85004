use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{
    date_column, datetime_column, format_date, format_datetime, json_column,
    optional_datetime_column, uuid_column,
};
use crate::db::DatabaseError;
use crate::models::{Alert, AlertSummary};

const ALERT_COLUMNS: &str =
    "a.id, a.patient_id, a.week_start, a.abnormal_count, a.recipients, a.sent_at, a.specialist_delivered_at";

/// Subquery yielding the patient's current specialist for the alert row `a`.
const CURRENT_SPECIALIST_OF_A: &str = "(SELECT sa.specialist_id FROM specialist_assignments sa
      WHERE sa.patient_id = a.patient_id
      ORDER BY sa.assigned_at DESC, sa.rowid DESC
      LIMIT 1)";

/// Insert an alert unless one already exists for the same patient and week.
///
/// Returns `false` when the `(patient_id, week_start)` slot was already taken.
/// The uniqueness constraint makes this safe for concurrent writers.
pub fn insert_alert_if_absent(conn: &Connection, alert: &Alert) -> Result<bool, DatabaseError> {
    let recipients_json = serde_json::to_string(&alert.recipients)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid recipients: {e}")))?;

    let affected = conn.execute(
        "INSERT INTO alerts
         (id, patient_id, week_start, abnormal_count, recipients, sent_at, specialist_delivered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (patient_id, week_start) DO NOTHING",
        params![
            alert.id.to_string(),
            alert.patient_id.to_string(),
            format_date(&alert.week_start),
            alert.abnormal_count,
            recipients_json,
            format_datetime(&alert.sent_at),
            alert.specialist_delivered_at.as_ref().map(format_datetime),
        ],
    )?;
    Ok(affected == 1)
}

pub fn get_alert(conn: &Connection, id: &Uuid) -> Result<Option<Alert>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM alerts a WHERE a.id = ?1"),
        params![id.to_string()],
        row_to_alert,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// The alert already raised for a patient in the week starting `week_start`.
pub fn get_alert_for_week(
    conn: &Connection,
    patient_id: &Uuid,
    week_start: &NaiveDate,
) -> Result<Option<Alert>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM alerts a WHERE a.patient_id = ?1 AND a.week_start = ?2"),
        params![patient_id.to_string(), format_date(week_start)],
        row_to_alert,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// All alerts for a patient, newest week first.
pub fn list_alerts_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts a
         WHERE a.patient_id = ?1
         ORDER BY a.week_start DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_alert)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Undelivered alerts for patients currently assigned to `specialist_id`, oldest first.
pub fn get_pending_specialist_alerts(
    conn: &Connection,
    specialist_id: &Uuid,
) -> Result<Vec<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts a
         WHERE a.specialist_delivered_at IS NULL
           AND {CURRENT_SPECIALIST_OF_A} = ?1
         ORDER BY a.sent_at ASC, a.rowid ASC"
    ))?;
    let rows = stmt.query_map(params![specialist_id.to_string()], row_to_alert)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Same selection as `get_pending_specialist_alerts`, projected for display.
pub fn get_pending_alert_summaries(
    conn: &Connection,
    specialist_id: &Uuid,
) -> Result<Vec<AlertSummary>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT a.id, a.patient_id, p.name, a.week_start, a.abnormal_count, a.sent_at
         FROM alerts a
         JOIN patients p ON p.id = a.patient_id
         WHERE a.specialist_delivered_at IS NULL
           AND {CURRENT_SPECIALIST_OF_A} = ?1
         ORDER BY a.sent_at ASC, a.rowid ASC"
    ))?;
    let rows = stmt.query_map(params![specialist_id.to_string()], |row| {
        Ok(AlertSummary {
            alert_id: uuid_column(row, 0)?,
            patient_id: uuid_column(row, 1)?,
            patient_name: row.get(2)?,
            week_start: date_column(row, 3)?,
            abnormal_count: row.get(4)?,
            sent_at: datetime_column(row, 5)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Stamp an alert as delivered to the specialist who currently owns its patient.
///
/// Returns `false` when nothing changed: the alert is unknown, already
/// delivered, or its patient is assigned to someone else.
pub fn mark_specialist_delivered(
    conn: &Connection,
    alert_id: &Uuid,
    specialist_id: &Uuid,
    delivered_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        &format!(
            "UPDATE alerts AS a SET specialist_delivered_at = ?1
             WHERE a.id = ?2
               AND a.specialist_delivered_at IS NULL
               AND {CURRENT_SPECIALIST_OF_A} = ?3"
        ),
        params![
            format_datetime(delivered_at),
            alert_id.to_string(),
            specialist_id.to_string(),
        ],
    )?;
    Ok(affected == 1)
}

fn row_to_alert(row: &rusqlite::Row) -> Result<Alert, rusqlite::Error> {
    Ok(Alert {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        week_start: date_column(row, 2)?,
        abnormal_count: row.get(3)?,
        recipients: json_column(row, 4)?,
        sent_at: datetime_column(row, 5)?,
        specialist_delivered_at: optional_datetime_column(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Recipient, RecipientRole};

    fn make_alert(patient_id: Uuid, week_start: &str, sent_at: &str) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            patient_id,
            week_start: NaiveDate::parse_from_str(week_start, "%Y-%m-%d").unwrap(),
            abnormal_count: 4,
            recipients: vec![Recipient {
                user_id: patient_id,
                role: RecipientRole::Patient,
                name: "Amara".into(),
                email: None,
            }],
            sent_at: at(sent_at),
            specialist_delivered_at: None,
        }
    }

    #[test]
    fn second_alert_for_same_week_is_ignored() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");

        let first = make_alert(patient.id, "2026-03-02", "2026-03-04 10:00:00");
        let second = make_alert(patient.id, "2026-03-02", "2026-03-05 10:00:00");
        assert!(insert_alert_if_absent(&conn, &first).unwrap());
        assert!(!insert_alert_if_absent(&conn, &second).unwrap());

        let week = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let stored = get_alert_for_week(&conn, &patient.id, &week).unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.recipients, first.recipients);
        assert_eq!(list_alerts_for_patient(&conn, &patient.id).unwrap().len(), 1);
    }

    #[test]
    fn different_weeks_both_stored() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        assert!(insert_alert_if_absent(&conn, &make_alert(patient.id, "2026-03-02", "2026-03-04 10:00:00")).unwrap());
        assert!(insert_alert_if_absent(&conn, &make_alert(patient.id, "2026-03-09", "2026-03-10 10:00:00")).unwrap());

        let alerts = list_alerts_for_patient(&conn, &patient.id).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].week_start, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    }

    #[test]
    fn pending_follows_current_assignment() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        let old = make_specialist(&conn, "Dr. Obi");
        let new = make_specialist(&conn, "Dr. Lund");
        assign(&conn, &patient, &old, "2026-01-01 09:00:00");
        insert_alert_if_absent(&conn, &make_alert(patient.id, "2026-03-02", "2026-03-04 10:00:00")).unwrap();

        assert_eq!(get_pending_specialist_alerts(&conn, &old.id).unwrap().len(), 1);

        assign(&conn, &patient, &new, "2026-03-05 09:00:00");
        assert!(get_pending_specialist_alerts(&conn, &old.id).unwrap().is_empty());
        assert_eq!(get_pending_specialist_alerts(&conn, &new.id).unwrap().len(), 1);
    }

    #[test]
    fn pending_is_oldest_first_with_patient_name() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        let specialist = make_specialist(&conn, "Dr. Obi");
        assign(&conn, &patient, &specialist, "2026-01-01 09:00:00");
        let later = make_alert(patient.id, "2026-03-09", "2026-03-10 10:00:00");
        let earlier = make_alert(patient.id, "2026-03-02", "2026-03-04 10:00:00");
        insert_alert_if_absent(&conn, &later).unwrap();
        insert_alert_if_absent(&conn, &earlier).unwrap();

        let summaries = get_pending_alert_summaries(&conn, &specialist.id).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].alert_id, earlier.id);
        assert_eq!(summaries[1].alert_id, later.id);
        assert_eq!(summaries[0].patient_name, "Amara");
    }

    #[test]
    fn mark_delivered_only_once_and_only_by_owner() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        let owner = make_specialist(&conn, "Dr. Obi");
        let stranger = make_specialist(&conn, "Dr. Lund");
        assign(&conn, &patient, &owner, "2026-01-01 09:00:00");
        let alert = make_alert(patient.id, "2026-03-02", "2026-03-04 10:00:00");
        insert_alert_if_absent(&conn, &alert).unwrap();
        let now = at("2026-03-06 08:00:00");

        assert!(!mark_specialist_delivered(&conn, &alert.id, &stranger.id, &now).unwrap());
        assert!(mark_specialist_delivered(&conn, &alert.id, &owner.id, &now).unwrap());
        assert!(!mark_specialist_delivered(&conn, &alert.id, &owner.id, &now).unwrap());

        let stored = get_alert(&conn, &alert.id).unwrap().unwrap();
        assert_eq!(stored.specialist_delivered_at, Some(now));
        assert!(get_pending_specialist_alerts(&conn, &owner.id).unwrap().is_empty());
    }
}
