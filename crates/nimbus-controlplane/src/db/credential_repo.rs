//! Credential repository: CRUD operations for the `credentials` table.
//!
//! Every read and write is scoped by owner; a credential owned by someone
//! else looks exactly like a missing one.

use rusqlite::{Row, params};

use super::{Database, DatabaseError};
use crate::model::Credential;

impl Credential {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            provider: row.get("provider")?,
            access_key: row.get("access_key")?,
            sealed_secret: row.get("secret_key")?,
            region: row.get("region")?,
            name: row.get("name")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert(db: &Database, cred: &Credential) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO credentials (id, user_id, provider, access_key, secret_key, region,
             name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                cred.id,
                cred.user_id,
                cred.provider,
                cred.access_key,
                cred.sealed_secret,
                cred.region,
                cred.name,
                cred.description,
                cred.created_at,
                cred.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Unscoped lookup; only the worker uses it, after the task already proved ownership.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Credential>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM credentials WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], Credential::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn find_for_user(
    db: &Database,
    id: &str,
    user_id: &str,
) -> Result<Option<Credential>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM credentials WHERE id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![id, user_id], Credential::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn list_for_user(db: &Database, user_id: &str) -> Result<Vec<Credential>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM credentials WHERE user_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![user_id], Credential::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Overwrites every mutable column of an owned credential.
pub fn update(db: &Database, cred: &Credential) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE credentials SET provider = ?3, access_key = ?4, secret_key = ?5, region = ?6,
             name = ?7, description = ?8, updated_at = ?9
             WHERE id = ?1 AND user_id = ?2",
            params![
                cred.id,
                cred.user_id,
                cred.provider,
                cred.access_key,
                cred.sealed_secret,
                cred.region,
                cred.name,
                cred.description,
                cred.updated_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Outcome of a delete attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Tasks still reference the credential
    InUse(u64),
}

/// Deletes an owned credential unless a task still references it.
pub fn delete(db: &Database, id: &str, user_id: &str) -> Result<DeleteOutcome, DatabaseError> {
    db.with_tx(|tx| {
        let owned: u64 = tx.query_row(
            "SELECT COUNT(*) FROM credentials WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            |r| r.get(0),
        )?;
        if owned == 0 {
            return Ok(DeleteOutcome::NotFound);
        }

        let referencing: u64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE credential_id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        if referencing > 0 {
            return Ok(DeleteOutcome::InUse(referencing));
        }

        tx.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
        Ok(DeleteOutcome::Deleted)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::user_repo;

    pub(crate) fn sample_credential(id: &str, user_id: &str) -> Credential {
        Credential {
            id: id.to_string(),
            user_id: user_id.to_string(),
            provider: "AWS".to_string(),
            access_key: "AKIAEXAMPLE".to_string(),
            sealed_secret: "sealed".to_string(),
            region: String::new(),
            name: format!("cred {}", id),
            description: String::new(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        user_repo::insert(&db, &user_repo::tests::sample_user("alice")).unwrap();
        user_repo::insert(&db, &user_repo::tests::sample_user("bob")).unwrap();
        db
    }

    #[test]
    fn test_owner_scoping() {
        let db = seeded();
        insert(&db, &sample_credential("c1", "user-alice")).unwrap();

        assert!(find_for_user(&db, "c1", "user-alice").unwrap().is_some());
        assert!(find_for_user(&db, "c1", "user-bob").unwrap().is_none());
        assert!(find_by_id(&db, "c1").unwrap().is_some());
        assert_eq!(list_for_user(&db, "user-alice").unwrap().len(), 1);
        assert!(list_for_user(&db, "user-bob").unwrap().is_empty());
    }

    #[test]
    fn test_update_is_owner_scoped() {
        let db = seeded();
        let mut cred = sample_credential("c1", "user-alice");
        insert(&db, &cred).unwrap();

        cred.description = "rotated".to_string();
        assert!(update(&db, &cred).unwrap());

        let mut foreign = cred.clone();
        foreign.user_id = "user-bob".to_string();
        assert!(!update(&db, &foreign).unwrap());

        let stored = find_by_id(&db, "c1").unwrap().unwrap();
        assert_eq!(stored.description, "rotated");
    }

    #[test]
    fn test_delete() {
        let db = seeded();
        insert(&db, &sample_credential("c1", "user-alice")).unwrap();

        assert_eq!(delete(&db, "c1", "user-bob").unwrap(), DeleteOutcome::NotFound);
        assert_eq!(delete(&db, "c1", "user-alice").unwrap(), DeleteOutcome::Deleted);
        assert!(find_by_id(&db, "c1").unwrap().is_none());
    }
}
