//! Queue repository: lease bookkeeping for the `queue_entries` table.
//!
//! An entry is available when `leased_until` is empty or already in the
//! past. Claiming stamps a new lease; acknowledging deletes the row.

use rusqlite::{OptionalExtension, params};

use super::{Database, DatabaseError};

/// Inserts an entry unless the task is already queued.
///
/// Returns `false` for a repeated push.
pub fn push(db: &Database, task_id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO queue_entries (task_id, enqueued_at) VALUES (?1, ?2)",
            params![task_id, now],
        )?;
        Ok(inserted > 0)
    })
}

/// Claims the oldest available entry, leasing it until `lease_until`.
///
/// Returns the task id and how many times it has now been delivered.
pub fn claim(
    db: &Database,
    now: &str,
    lease_until: &str,
) -> Result<Option<(String, u32)>, DatabaseError> {
    db.with_tx(|tx| {
        let next: Option<String> = tx
            .query_row(
                "SELECT task_id FROM queue_entries
                 WHERE leased_until = '' OR leased_until <= ?1
                 ORDER BY enqueued_at, rowid
                 LIMIT 1",
                params![now],
                |r| r.get(0),
            )
            .optional()?;

        let Some(task_id) = next else {
            return Ok(None);
        };

        let deliveries: u32 = tx.query_row(
            "UPDATE queue_entries SET leased_until = ?2, deliveries = deliveries + 1
             WHERE task_id = ?1
             RETURNING deliveries",
            params![task_id, lease_until],
            |r| r.get(0),
        )?;
        Ok(Some((task_id, deliveries)))
    })
}

/// Removes a delivered entry.
pub fn ack(db: &Database, task_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM queue_entries WHERE task_id = ?1", params![task_id])?;
        Ok(())
    })
}

pub fn len(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM queue_entries", [], |r| r.get(0))?)
    })
}
