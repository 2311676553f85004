use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{datetime_column, enum_column, format_datetime, json_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::{PatternSnapshot, Suggestion};

/// Append a suggestion. Identical content from earlier runs is not checked.
pub fn insert_suggestion(conn: &Connection, suggestion: &Suggestion) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO suggestions (id, patient_id, content, based_on_pattern, strength, generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            suggestion.id.to_string(),
            suggestion.patient_id.to_string(),
            suggestion.content,
            suggestion.based_on_pattern,
            suggestion.strength.as_str(),
            format_datetime(&suggestion.generated_at),
        ],
    )?;
    Ok(())
}

/// Suggestions for a patient, newest first.
pub fn list_suggestions_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Suggestion>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, content, based_on_pattern, strength, generated_at
         FROM suggestions
         WHERE patient_id = ?1
         ORDER BY generated_at DESC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(Suggestion {
            id: uuid_column(row, 0)?,
            patient_id: uuid_column(row, 1)?,
            content: row.get(2)?,
            based_on_pattern: row.get(3)?,
            strength: enum_column(row, 4)?,
            generated_at: datetime_column(row, 5)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn insert_pattern_snapshot(
    conn: &Connection,
    snapshot: &PatternSnapshot,
) -> Result<(), DatabaseError> {
    let map_json = serde_json::to_string(&snapshot.item_frequency_map)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid frequency map: {e}")))?;

    conn.execute(
        "INSERT INTO pattern_snapshots (id, patient_id, generated_at, item_frequency_map)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            snapshot.id.to_string(),
            snapshot.patient_id.to_string(),
            format_datetime(&snapshot.generated_at),
            map_json,
        ],
    )?;
    Ok(())
}

/// Snapshots for a patient, newest first.
pub fn list_pattern_snapshots(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<PatternSnapshot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, generated_at, item_frequency_map
         FROM pattern_snapshots
         WHERE patient_id = ?1
         ORDER BY generated_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(PatternSnapshot {
            id: uuid_column(row, 0)?,
            patient_id: uuid_column(row, 1)?,
            generated_at: datetime_column(row, 2)?,
            item_frequency_map: json_column(row, 3)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{BucketCounts, FrequencyMap, PatternStrength, TokenStats};

    #[test]
    fn identical_suggestions_are_both_kept() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        for _ in 0..2 {
            insert_suggestion(
                &conn,
                &Suggestion {
                    id: Uuid::new_v4(),
                    patient_id: patient.id,
                    content: "Consider reducing pizza".into(),
                    based_on_pattern: "pizza (4/5 times)".into(),
                    strength: PatternStrength::Strong,
                    generated_at: at("2026-03-04 10:00:00"),
                },
            )
            .unwrap();
        }

        let stored = list_suggestions_for_patient(&conn, &patient.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].strength, PatternStrength::Strong);
    }

    #[test]
    fn snapshot_map_round_trips() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn, "Amara");
        let mut map = FrequencyMap {
            total_abnormal: 5,
            ..Default::default()
        };
        map.tokens.insert(
            "pizza".into(),
            TokenStats {
                occurrences: 4,
                timing: BucketCounts {
                    evening: 3,
                    lunch: 1,
                    ..Default::default()
                },
            },
        );
        let snapshot = PatternSnapshot {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            generated_at: at("2026-03-04 10:00:00"),
            item_frequency_map: map.clone(),
        };
        insert_pattern_snapshot(&conn, &snapshot).unwrap();

        let stored = list_pattern_snapshots(&conn, &patient.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].item_frequency_map, map);
    }
}
