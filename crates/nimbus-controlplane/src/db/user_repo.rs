//! User repository: CRUD operations for the `users` table.

use rusqlite::{Connection, Row, params};

use super::{Database, DatabaseError};
use crate::model::User;

/// A user row including its password hash.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub user: User,
    pub password_hash: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user: User {
                id: row.get("id")?,
                username: row.get("username")?,
                email: row.get("email")?,
                role: row.get("role")?,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
            },
            password_hash: row.get("password_hash")?,
        })
    }
}

/// Inserts a new user row.
pub fn insert(db: &Database, row: &UserRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_in(conn, row))
}

/// Same as [`insert`] on an already locked connection or transaction.
pub fn insert_in(conn: &Connection, row: &UserRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.user.id,
            row.user.username,
            row.user.email,
            row.password_hash,
            row.user.role,
            row.user.created_at,
            row.user.updated_at,
        ],
    )?;
    Ok(())
}

fn find_one(db: &Database, column: &str, value: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT * FROM users WHERE {} = ?1", column);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![value], UserRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<UserRow>, DatabaseError> {
    find_one(db, "id", id)
}

pub fn find_by_username(db: &Database, username: &str) -> Result<Option<UserRow>, DatabaseError> {
    find_one(db, "username", username)
}

pub fn find_by_email(db: &Database, email: &str) -> Result<Option<UserRow>, DatabaseError> {
    find_one(db, "email", email)
}

/// Overwrites username, email, password hash and updated_at.
pub fn update(db: &Database, row: &UserRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE users SET username = ?2, email = ?3, password_hash = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                row.user.id,
                row.user.username,
                row.user.email,
                row.password_hash,
                row.user.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
}
