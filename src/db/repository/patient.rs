use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{datetime_column, format_datetime, uuid_column};
use crate::db::DatabaseError;
use crate::models::{Patient, PatientOverride, Specialist, SpecialistAssignment};

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, email, normal_low, normal_high, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.email,
            patient.threshold_override.normal_low,
            patient.threshold_override.normal_high,
            format_datetime(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        "SELECT id, name, email, normal_low, normal_high, created_at
         FROM patients WHERE id = ?1",
        params![id.to_string()],
        row_to_patient,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// The patient's threshold override; both bounds may be absent.
pub fn get_patient_override(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<PatientOverride, DatabaseError> {
    conn.query_row(
        "SELECT normal_low, normal_high FROM patients WHERE id = ?1",
        params![patient_id.to_string()],
        |row| {
            Ok(PatientOverride {
                normal_low: row.get(0)?,
                normal_high: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "patient".into(),
        id: patient_id.to_string(),
    })
}

/// Replace (or clear, with `PatientOverride::default()`) a patient's Normal band override.
pub fn set_patient_override(
    conn: &Connection,
    patient_id: &Uuid,
    value: &PatientOverride,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE patients SET normal_low = ?1, normal_high = ?2 WHERE id = ?3",
        params![value.normal_low, value.normal_high, patient_id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: patient_id.to_string(),
        });
    }
    Ok(())
}

pub fn insert_specialist(conn: &Connection, specialist: &Specialist) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO specialists (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            specialist.id.to_string(),
            specialist.name,
            specialist.email,
            format_datetime(&specialist.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_specialist(conn: &Connection, id: &Uuid) -> Result<Option<Specialist>, DatabaseError> {
    conn.query_row(
        "SELECT id, name, email, created_at FROM specialists WHERE id = ?1",
        params![id.to_string()],
        row_to_specialist,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Record a new assignment. Earlier assignments stay as history.
pub fn assign_specialist(
    conn: &Connection,
    assignment: &SpecialistAssignment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO specialist_assignments (id, patient_id, specialist_id, assigned_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            assignment.id.to_string(),
            assignment.patient_id.to_string(),
            assignment.specialist_id.to_string(),
            format_datetime(&assignment.assigned_at),
        ],
    )?;
    Ok(())
}

/// The most recently assigned specialist for a patient, if any.
pub fn get_current_specialist(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<Specialist>, DatabaseError> {
    conn.query_row(
        "SELECT s.id, s.name, s.email, s.created_at
         FROM specialist_assignments sa
         JOIN specialists s ON s.id = sa.specialist_id
         WHERE sa.patient_id = ?1
         ORDER BY sa.assigned_at DESC, sa.rowid DESC
         LIMIT 1",
        params![patient_id.to_string()],
        row_to_specialist,
    )
    .optional()
    .map_err(DatabaseError::from)
}

fn row_to_patient(row: &rusqlite::Row) -> Result<Patient, rusqlite::Error> {
    Ok(Patient {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        threshold_override: PatientOverride {
            normal_low: row.get(3)?,
            normal_high: row.get(4)?,
        },
        created_at: datetime_column(row, 5)?,
    })
}

fn row_to_specialist(row: &rusqlite::Row) -> Result<Specialist, rusqlite::Error> {
    Ok(Specialist {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: datetime_column(row, 3)?,
    })
}
