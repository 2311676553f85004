use rusqlite::{params, Connection};

use super::{datetime_column, format_datetime, uuid_column};
use crate::db::DatabaseError;
use crate::models::{ThresholdBands, ThresholdPolicy};

/// Append a policy version. Policies are never updated in place.
pub fn insert_threshold_policy(
    conn: &Connection,
    policy: &ThresholdPolicy,
) -> Result<(), DatabaseError> {
    let b = &policy.bands;
    conn.execute(
        "INSERT INTO threshold_policies
         (id, normal_low, normal_high, borderline_low, borderline_high,
          abnormal_low, abnormal_high, effective_from, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            policy.id.to_string(),
            b.normal_low,
            b.normal_high,
            b.borderline_low,
            b.borderline_high,
            b.abnormal_low,
            b.abnormal_high,
            format_datetime(&policy.effective_from),
            format_datetime(&policy.created_at),
        ],
    )?;
    Ok(())
}

/// All policy versions, oldest `effective_from` first; equal dates keep insertion order.
pub fn load_threshold_policies(conn: &Connection) -> Result<Vec<ThresholdPolicy>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, normal_low, normal_high, borderline_low, borderline_high,
                abnormal_low, abnormal_high, effective_from, created_at
         FROM threshold_policies
         ORDER BY effective_from ASC, rowid ASC",
    )?;
    let rows = stmt.query_map([], row_to_policy)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

fn row_to_policy(row: &rusqlite::Row) -> Result<ThresholdPolicy, rusqlite::Error> {
    Ok(ThresholdPolicy {
        id: uuid_column(row, 0)?,
        bands: ThresholdBands {
            normal_low: row.get(1)?,
            normal_high: row.get(2)?,
            borderline_low: row.get(3)?,
            borderline_high: row.get(4)?,
            abnormal_low: row.get(5)?,
            abnormal_high: row.get(6)?,
        },
        effective_from: datetime_column(row, 7)?,
        created_at: datetime_column(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn empty_table_loads_nothing() {
        let conn = open_memory_database().unwrap();
        assert!(load_threshold_policies(&conn).unwrap().is_empty());
    }

    #[test]
    fn policies_load_in_effective_order() {
        let conn = open_memory_database().unwrap();
        let later = make_policy(&conn, standard_bands(), "2026-03-01 00:00:00");
        let earlier = make_policy(&conn, standard_bands(), "2026-01-01 00:00:00");

        let loaded = load_threshold_policies(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, earlier.id);
        assert_eq!(loaded[1].id, later.id);
    }

    #[test]
    fn bounds_survive_storage_exactly() {
        let conn = open_memory_database().unwrap();
        let policy = make_policy(&conn, standard_bands(), "2026-01-01 00:00:00");

        let loaded = load_threshold_policies(&conn).unwrap();
        assert_eq!(loaded[0], policy);
    }
}
