use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{datetime_column, enum_column, format_datetime, uuid_column};
use crate::db::DatabaseError;
use crate::models::{Category, Reading};

const READING_COLUMNS: &str = "id, patient_id, taken_at, value, unit, food_tags, activity_tags,
     event, symptom_tags, free_notes, category, created_at";

/// Insert a categorized reading.
pub fn insert_reading(conn: &Connection, reading: &Reading) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO readings (id, patient_id, taken_at, value, unit, food_tags, activity_tags,
                               event, symptom_tags, free_notes, category, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            reading.id.to_string(),
            reading.patient_id.to_string(),
            format_datetime(&reading.taken_at),
            reading.value,
            reading.unit,
            reading.food_tags,
            reading.activity_tags,
            reading.event,
            reading.symptom_tags,
            reading.free_notes,
            reading.category.as_str(),
            format_datetime(&reading.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_reading(conn: &Connection, id: &Uuid) -> Result<Option<Reading>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {READING_COLUMNS} FROM readings WHERE id = ?1"),
        params![id.to_string()],
        row_to_reading,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Change a reading's value together with its recomputed category.
pub fn update_reading_value(
    conn: &Connection,
    id: &Uuid,
    value: f64,
    category: Category,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE readings SET value = ?1, category = ?2 WHERE id = ?3",
        params![value, category.as_str(), id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "reading".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Delete a reading owned by the given patient.
pub fn delete_reading(conn: &Connection, id: &Uuid, patient_id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM readings WHERE id = ?1 AND patient_id = ?2",
        params![id.to_string(), patient_id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "reading".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Count a patient's readings of one category with `from <= taken_at <= to`.
pub fn count_readings_in_window(
    conn: &Connection,
    patient_id: &Uuid,
    category: Category,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM readings
         WHERE patient_id = ?1 AND category = ?2 AND taken_at >= ?3 AND taken_at <= ?4",
        params![
            patient_id.to_string(),
            category.as_str(),
            format_datetime(from),
            format_datetime(to),
        ],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// A patient's readings of one category within `[from, to]`, oldest first.
pub fn get_readings_in_window(
    conn: &Connection,
    patient_id: &Uuid,
    category: Category,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<Reading>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {READING_COLUMNS} FROM readings
         WHERE patient_id = ?1 AND category = ?2 AND taken_at >= ?3 AND taken_at <= ?4
         ORDER BY taken_at ASC"
    ))?;
    let rows = stmt.query_map(
        params![
            patient_id.to_string(),
            category.as_str(),
            format_datetime(from),
            format_datetime(to),
        ],
        row_to_reading,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Every reading a patient has ever recorded, oldest first.
pub fn get_readings_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Reading>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {READING_COLUMNS} FROM readings
         WHERE patient_id = ?1
         ORDER BY taken_at ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_reading)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

fn row_to_reading(row: &rusqlite::Row) -> Result<Reading, rusqlite::Error> {
    Ok(Reading {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        taken_at: datetime_column(row, 2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        food_tags: row.get(5)?,
        activity_tags: row.get(6)?,
        event: row.get(7)?,
        symptom_tags: row.get(8)?,
        free_notes: row.get(9)?,
        category: enum_column(row, 10)?,
        created_at: datetime_column(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_retrieve() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        let reading = make_reading(&conn, patient.id, "2026-03-02 08:30:00", Category::Abnormal, Some("Pizza, soda"));

        let loaded = get_reading(&conn, &reading.id).unwrap().unwrap();
        assert_eq!(loaded.category, Category::Abnormal);
        assert_eq!(loaded.taken_at, at("2026-03-02 08:30:00"));
        assert_eq!(loaded.food_tags.as_deref(), Some("Pizza, soda"));
    }

    #[test]
    fn reading_requires_known_patient() {
        let conn = open_memory_database().unwrap();
        let mut reading = Reading {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            taken_at: at("2026-03-02 08:30:00"),
            value: 95.0,
            unit: "mg/dL".into(),
            food_tags: None,
            activity_tags: None,
            event: None,
            symptom_tags: None,
            free_notes: None,
            category: Category::Normal,
            created_at: at("2026-03-02 08:30:00"),
        };
        assert!(insert_reading(&conn, &reading).is_err());

        reading.patient_id = make_patient(&conn, "Amara").id;
        assert!(insert_reading(&conn, &reading).is_ok());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        make_reading(&conn, patient.id, "2026-03-01 12:00:00", Category::Abnormal, None);
        make_reading(&conn, patient.id, "2026-03-05 12:00:00", Category::Abnormal, None);
        make_reading(&conn, patient.id, "2026-03-08 12:00:00", Category::Abnormal, None);
        make_reading(&conn, patient.id, "2026-03-08 12:00:01", Category::Abnormal, None);
        make_reading(&conn, patient.id, "2026-03-05 13:00:00", Category::Normal, None);

        let from = at("2026-03-01 12:00:00");
        let to = at("2026-03-08 12:00:00");
        let count = count_readings_in_window(&conn, &patient.id, Category::Abnormal, &from, &to).unwrap();
        assert_eq!(count, 3);

        let rows = get_readings_in_window(&conn, &patient.id, Category::Abnormal, &from, &to).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].taken_at <= w[1].taken_at));
    }

    #[test]
    fn update_changes_value_and_category() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        let reading = make_reading(&conn, patient.id, "2026-03-02 08:30:00", Category::Normal, None);

        update_reading_value(&conn, &reading.id, 210.0, Category::Abnormal).unwrap();
        let loaded = get_reading(&conn, &reading.id).unwrap().unwrap();
        assert_eq!(loaded.category, Category::Abnormal);
        assert!((loaded.value - 210.0).abs() < f64::EPSILON);
    }

    #[test]
    fn delete_checks_owner() {
        let conn = open_memory_database().unwrap();
        let owner = make_patient(&conn, "Amara");
        let other = make_patient(&conn, "Jonas");
        let reading = make_reading(&conn, owner.id, "2026-03-02 08:30:00", Category::Normal, None);

        assert!(matches!(
            delete_reading(&conn, &reading.id, &other.id),
            Err(DatabaseError::NotFound { .. })
        ));
        delete_reading(&conn, &reading.id, &owner.id).unwrap();
        assert!(get_reading(&conn, &reading.id).unwrap().is_none());
    }
}
