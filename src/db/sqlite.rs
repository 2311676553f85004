use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tracing;

use super::DatabaseError;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = open_connection(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open a connection to an already-migrated database.
pub fn open_connection(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, i64>(0),
    )
    .unwrap_or(0)
}

/// Handle to the monitoring database file.
///
/// Background work runs on blocking threads, and a rusqlite `Connection`
/// cannot be shared across them, so each unit of work opens its own
/// connection from this handle. Migrations run once, in `initialize`.
#[derive(Debug, Clone)]
pub struct MonitorDb {
    path: PathBuf,
}

impl MonitorDb {
    /// Create (if needed) and migrate the database at `path`.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DatabaseError::MigrationFailed {
                    version: 0,
                    reason: format!("cannot create {}: {e}", parent.display()),
                })?;
            }
        }
        open_database(&path)?;
        tracing::info!(path = %path.display(), "Monitoring database ready");
        Ok(Self { path })
    }

    /// Open a fresh connection for one unit of work.
    pub fn open(&self) -> Result<Connection, DatabaseError> {
        open_connection(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_tables(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 8 entity tables + schema_version
        let count = count_tables(&conn);
        assert_eq!(count, 9, "Expected 9 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        // Run migrations again — should not error
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn handle_connections_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = MonitorDb::initialize(dir.path().join("nested").join("vitalwatch.db")).unwrap();

        let first = db.open().unwrap();
        first
            .execute(
                "INSERT INTO specialists (id, name, created_at) VALUES ('s1', 'Dr. Ade', '2026-01-01 00:00:00')",
                [],
            )
            .unwrap();

        let second = db.open().unwrap();
        let count: i64 = second
            .query_row("SELECT COUNT(*) FROM specialists", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
