use rusqlite::Connection;

/// Bumped whenever the table layout changes.
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS students (
    student_id     TEXT PRIMARY KEY NOT NULL,
    name           TEXT NOT NULL,
    course         TEXT NOT NULL,
    class_year     TEXT NOT NULL,
    division       TEXT NOT NULL,
    face_signature BLOB,
    face_enrolled  INTEGER NOT NULL DEFAULT 0,
    enrolled_at    TEXT
);

CREATE INDEX IF NOT EXISTS students_by_class
    ON students (course, class_year, division);

CREATE TABLE IF NOT EXISTS attendance (
    id         TEXT PRIMARY KEY NOT NULL,
    student_id TEXT NOT NULL REFERENCES students (student_id),
    subject_id TEXT NOT NULL,
    date       TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (student_id, subject_id, date)
);
";

pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(CREATE_TABLES)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::debug!(from = version, to = SCHEMA_VERSION, "directory schema migrated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
