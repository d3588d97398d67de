use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

const USER_COLUMNS: &str = "id, email, password_hash, namespace_id, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        namespace_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        namespace_id: row.get(0)?,
        seq: row.get(1)?,
        name: row.get(2)?,
        size_bytes: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, email, password_hash, namespace_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.namespace_id,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                if msg.as_deref().is_some_and(|m| m.contains("users.namespace_id")) {
                    Err(Error::NamespaceCollision)
                } else {
                    Err(Error::AlreadyExists)
                }
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Track record operations

    fn record_track(
        &self,
        namespace_id: &str,
        name: &str,
        size_bytes: i64,
    ) -> Result<TrackRecord> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO track_sequences (namespace_id, last_seq) VALUES (?1, 1)
             ON CONFLICT(namespace_id) DO UPDATE SET last_seq = last_seq + 1",
            params![namespace_id],
        )?;

        let seq: i64 = tx.query_row(
            "SELECT last_seq FROM track_sequences WHERE namespace_id = ?1",
            params![namespace_id],
            |row| row.get(0),
        )?;

        // The file itself was created exclusively, so any row with this name is stale.
        tx.execute(
            "DELETE FROM track_records WHERE namespace_id = ?1 AND name = ?2",
            params![namespace_id, name],
        )?;

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO track_records (namespace_id, seq, name, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                namespace_id,
                seq,
                name,
                size_bytes,
                format_datetime(&created_at)
            ],
        )?;

        tx.commit()?;

        Ok(TrackRecord {
            namespace_id: namespace_id.to_string(),
            seq,
            name: name.to_string(),
            size_bytes,
            created_at,
        })
    }

    fn get_track_by_seq(&self, namespace_id: &str, seq: i64) -> Result<Option<TrackRecord>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT namespace_id, seq, name, size_bytes, created_at
             FROM track_records WHERE namespace_id = ?1 AND seq = ?2",
            params![namespace_id, seq],
            track_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_track_records(&self, namespace_id: &str) -> Result<Vec<TrackRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT namespace_id, seq, name, size_bytes, created_at
             FROM track_records WHERE namespace_id = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![namespace_id], track_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_track_record(&self, namespace_id: &str, name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM track_records WHERE namespace_id = ?1 AND name = ?2",
            params![namespace_id, name],
        )?;
        Ok(rows > 0)
    }
}
