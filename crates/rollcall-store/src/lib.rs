//! rollcall-store: SQLite directory of students, enrolled signatures and
//! attendance rows.
//!
//! One [`SqliteDirectory`] wraps one connection behind a mutex, so it can be
//! shared by reference with the core's enrollment and attendance flows.

mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::codec::{decode_signature, encode_signature};
use rollcall_core::{DirectoryStore, FaceSignature, Gallery, PopulationFilter, StoreError};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

pub use schema::SCHEMA_VERSION;

const DATE_FORMAT: &str = "%Y-%m-%d";
const STATUS_PRESENT: &str = "present";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("student {0} already exists")]
    DuplicateStudent(String),
    #[error("malformed {column} in stored row: {value}")]
    MalformedRow { column: &'static str, value: String },
    #[error("directory connection lock poisoned")]
    Poisoned,
}

impl From<DirectoryError> for StoreError {
    fn from(err: DirectoryError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A student to register.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub course: String,
    pub class_year: String,
    pub division: String,
}

/// A stored student, without the signature bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub student_id: String,
    pub name: String,
    pub course: String,
    pub class_year: String,
    pub division: String,
    pub face_enrolled: bool,
    pub enrolled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        tracing::info!(path = %path.display(), "directory opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DirectoryError> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DirectoryError> {
        self.conn.lock().map_err(|_| DirectoryError::Poisoned)
    }

    pub fn add_student(&self, student: &NewStudent) -> Result<(), DirectoryError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO students (student_id, name, course, class_year, division)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                student.student_id,
                student.name,
                student.course,
                student.class_year,
                student.division
            ],
        );
        match result {
            Ok(_) => {
                tracing::info!(student_id = %student.student_id, "student added");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(DirectoryError::DuplicateStudent(student.student_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn student(&self, student_id: &str) -> Result<Option<StudentRecord>, DirectoryError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT student_id, name, course, class_year, division, face_enrolled, enrolled_at
                 FROM students WHERE student_id = ?1",
                params![student_id],
                |row| {
                    Ok((
                        StudentRecord {
                            student_id: row.get(0)?,
                            name: row.get(1)?,
                            course: row.get(2)?,
                            class_year: row.get(3)?,
                            division: row.get(4)?,
                            face_enrolled: row.get(5)?,
                            enrolled_at: None,
                        },
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(mut record, enrolled_at)| {
            record.enrolled_at = enrolled_at
                .map(|raw| parse_timestamp("enrolled_at", &raw))
                .transpose()?;
            Ok(record)
        })
        .transpose()
    }

    /// Attendance rows recorded for one subject on one day, by student id.
    pub fn attendance_for(
        &self,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, DirectoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, student_id, subject_id, date, status, created_at, updated_at
             FROM attendance WHERE subject_id = ?1 AND date = ?2
             ORDER BY student_id",
        )?;
        let rows = stmt
            .query_map(params![subject_id, format_date(date)], |row| {
                Ok([
                    row.get::<_, String>(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ])
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|[id, student_id, subject_id, date, status, created_at, updated_at]| {
                Ok(AttendanceRecord {
                    date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| {
                        DirectoryError::MalformedRow {
                            column: "date",
                            value: date.clone(),
                        }
                    })?,
                    created_at: parse_timestamp("created_at", &created_at)?,
                    updated_at: parse_timestamp("updated_at", &updated_at)?,
                    id,
                    student_id,
                    subject_id,
                    status,
                })
            })
            .collect()
    }

    fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, DirectoryError> {
        let found = conn
            .query_row(
                "SELECT 1 FROM students WHERE student_id = ?1",
                params![student_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl DirectoryStore for SqliteDirectory {
    fn fetch_gallery(&self, filter: &PopulationFilter) -> Result<Gallery, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT student_id, face_signature FROM students
                 WHERE course = ?1 AND class_year = ?2
                   AND (?3 IS NULL OR division = ?3)
                   AND face_enrolled = 1 AND face_signature IS NOT NULL
                 ORDER BY student_id",
            )
            .map_err(DirectoryError::from)?;
        let rows = stmt
            .query_map(
                params![filter.course, filter.class_year, filter.division],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(DirectoryError::from)?;

        let mut gallery = Gallery::new();
        for (student_id, blob) in rows {
            let signature = decode_signature(&blob).map_err(|source| {
                tracing::warn!(student_id = %student_id, error = %source, "corrupt stored signature");
                StoreError::CorruptSignature {
                    student_id: student_id.clone(),
                    source,
                }
            })?;
            gallery.insert(student_id, signature);
        }
        tracing::debug!(
            course = %filter.course,
            class_year = %filter.class_year,
            enrolled = gallery.len(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    fn fetch_enrollment_state(&self, student_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT face_enrolled FROM students WHERE student_id = ?1",
            params![student_id],
            |row| row.get::<_, bool>(0),
        )
        .optional()
        .map_err(DirectoryError::from)?
        .ok_or_else(|| StoreError::StudentNotFound(student_id.to_string()))
    }

    fn fetch_signature(&self, student_id: &str) -> Result<Option<FaceSignature>, StoreError> {
        let conn = self.conn()?;
        let blob = conn
            .query_row(
                "SELECT face_signature FROM students WHERE student_id = ?1",
                params![student_id],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()
            .map_err(DirectoryError::from)?
            .ok_or_else(|| StoreError::StudentNotFound(student_id.to_string()))?;

        blob.as_deref()
            .map(decode_signature)
            .transpose()
            .map_err(|source| StoreError::CorruptSignature {
                student_id: student_id.to_string(),
                source,
            })
    }

    fn persist_signature(
        &self,
        student_id: &str,
        signature: &FaceSignature,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        // Blob and flag change in one statement.
        let updated = conn
            .execute(
                "UPDATE students
                 SET face_signature = ?1, face_enrolled = 1, enrolled_at = ?2
                 WHERE student_id = ?3",
                params![encode_signature(signature), now(), student_id],
            )
            .map_err(DirectoryError::from)?;
        if updated == 0 {
            return Err(StoreError::StudentNotFound(student_id.to_string()));
        }
        Ok(())
    }

    fn record_identification(
        &self,
        student_id: &str,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        if !Self::student_exists(&conn, student_id)? {
            return Err(StoreError::StudentNotFound(student_id.to_string()));
        }
        let timestamp = now();
        conn.execute(
            "INSERT INTO attendance (id, student_id, subject_id, date, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (student_id, subject_id, date)
             DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![
                uuid::Uuid::new_v4().to_string(),
                student_id,
                subject_id,
                format_date(date),
                STATUS_PRESENT,
                timestamp
            ],
        )
        .map_err(DirectoryError::from)?;
        tracing::debug!(student_id, subject_id, %date, "attendance row written");
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_timestamp(column: &'static str, raw: &str) -> Result<DateTime<Utc>, DirectoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DirectoryError::MalformedRow {
            column,
            value: raw.to_string(),
        })
}
