//! Result repository: append-only rows of the `task_results` table.

use rusqlite::{Connection, Row, params};

use super::{Database, DatabaseError, new_id};
use crate::model::TaskResult;

impl TaskResult {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            result: row.get("result")?,
            error: row.get("error")?,
            timestamp: row.get("timestamp")?,
        })
    }
}

pub(crate) fn insert_in(
    conn: &Connection,
    task_id: &str,
    result: &str,
    error: &str,
    now: &str,
) -> Result<TaskResult, DatabaseError> {
    let row = TaskResult {
        id: new_id(),
        task_id: task_id.to_string(),
        result: result.to_string(),
        error: error.to_string(),
        timestamp: now.to_string(),
    };
    conn.execute(
        "INSERT INTO task_results (id, task_id, result, error, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.id, row.task_id, row.result, row.error, row.timestamp],
    )?;
    Ok(row)
}

/// Results of one task in insertion order.
pub fn list_for_task(db: &Database, task_id: &str) -> Result<Vec<TaskResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM task_results WHERE task_id = ?1 ORDER BY rowid")?;
        let rows = stmt
            .query_map(params![task_id], TaskResult::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Newest successful result of a task.
pub fn latest_success(db: &Database, task_id: &str) -> Result<Option<TaskResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM task_results WHERE task_id = ?1 AND error = ''
             ORDER BY rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![task_id], TaskResult::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::task_repo;

    #[test]
    fn test_results_keep_insertion_order() {
        let db = task_repo::tests::seeded();
        let task = task_repo::create(&db, &task_repo::tests::new_task("enumerate", "{}"), "t0")
            .unwrap();

        task_repo::append_result(&db, &task.id, r#"{"n":1}"#, "", "t1").unwrap();
        task_repo::append_result(&db, &task.id, "", "boom", "t2").unwrap();
        task_repo::append_result(&db, &task.id, r#"{"n":3}"#, "", "t3").unwrap();

        let rows = list_for_task(&db, &task.id).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].error, "boom");

        let latest = latest_success(&db, &task.id).unwrap().unwrap();
        assert_eq!(latest.result, r#"{"n":3}"#);
    }

    #[test]
    fn test_result_requires_existing_task() {
        let db = task_repo::tests::seeded();
        assert!(task_repo::append_result(&db, "missing", "{}", "", "t").is_err());
    }
}
