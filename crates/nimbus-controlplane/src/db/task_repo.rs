//! Task repository: the task store.
//!
//! Status changes are guarded inside the `UPDATE` itself
//! (`WHERE status IN (<allowed predecessors>)`), so concurrent writers can
//! never move a task backwards. Terminal transitions write the result row
//! and the status in one transaction.

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Database, DatabaseError, new_id, result_repo};
use crate::error::{ControlPlaneError, Result};
use crate::model::{Task, TaskOutcome, TaskResult, TaskStatus};

impl Task {
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        let status: TaskStatus = status.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown task status {:?}", status).into(),
            )
        })?;
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            credential_id: row.get("credential_id")?,
            name: row.get("name")?,
            task_type: row.get("task_type")?,
            status,
            parameters: row.get("parameters")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Input of [`create`]
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub user_id: &'a str,
    pub credential_id: &'a str,
    pub task_type: &'a str,
    pub name: &'a str,
    pub parameters: &'a str,
}

/// Creates a `pending` task after checking the credential belongs to the user.
pub fn create(db: &Database, new: &NewTask<'_>, now: &str) -> Result<Task> {
    db.with_tx(|tx| {
        let owned: Option<String> = tx
            .query_row(
                "SELECT id FROM credentials WHERE id = ?1 AND user_id = ?2",
                params![new.credential_id, new.user_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(DatabaseError::from)?;
        if owned.is_none() {
            return Err(ControlPlaneError::not_found("Credential"));
        }

        let id = new_id();
        tx.execute(
            "INSERT INTO tasks (id, user_id, credential_id, name, task_type, status, parameters,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?7)",
            params![
                id,
                new.user_id,
                new.credential_id,
                new.name,
                new.task_type,
                new.parameters,
                now,
            ],
        )
        .map_err(DatabaseError::from)?;

        load(tx, &id)?.ok_or_else(|| ControlPlaneError::not_found("Task"))
    })
}

fn load(conn: &Connection, id: &str) -> std::result::Result<Option<Task>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], Task::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn get(db: &Database, id: &str) -> std::result::Result<Option<Task>, DatabaseError> {
    db.with_conn(|conn| load(conn, id))
}

pub fn get_for_user(
    db: &Database,
    id: &str,
    user_id: &str,
) -> std::result::Result<Option<Task>, DatabaseError> {
    Ok(get(db, id)?.filter(|task| task.user_id == user_id))
}

/// Newest first.
pub fn list_for_user(
    db: &Database,
    user_id: &str,
) -> std::result::Result<Vec<Task>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Task::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn transition(conn: &Connection, id: &str, next: TaskStatus, now: &str) -> Result<Task> {
    let allowed = next
        .predecessors()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    // start_time is stamped once, on the first move out of pending
    let sql = format!(
        "UPDATE tasks SET
            status = ?2,
            updated_at = ?3,
            start_time = CASE WHEN start_time = '' THEN ?3 ELSE start_time END,
            end_time = CASE WHEN ?2 IN ('completed', 'failed') THEN ?3 ELSE end_time END
         WHERE id = ?1 AND status IN ({})",
        allowed
    );
    let changed = conn
        .execute(&sql, params![id, next.as_str(), now])
        .map_err(DatabaseError::from)?;

    let task = load(conn, id)?.ok_or_else(|| ControlPlaneError::not_found("Task"))?;
    if changed == 0 {
        return Err(ControlPlaneError::Conflict(format!(
            "task {} cannot move from {} to {}",
            id, task.status, next
        )));
    }
    Ok(task)
}

/// Moves a task to `status` and stamps the matching timestamp.
///
/// A transition outside the allowed graph fails with `Conflict` and leaves
/// the row untouched.
pub fn update_status(db: &Database, id: &str, status: TaskStatus, now: &str) -> Result<Task> {
    db.with_tx(|tx| transition(tx, id, status, now))
}

/// Appends a result row without touching the task status.
pub fn append_result(
    db: &Database,
    task_id: &str,
    result: &str,
    error: &str,
    now: &str,
) -> std::result::Result<TaskResult, DatabaseError> {
    db.with_conn(|conn| result_repo::insert_in(conn, task_id, result, error, now))
}

/// Writes the outcome row and the terminal status atomically.
pub fn finish(
    db: &Database,
    id: &str,
    outcome: &TaskOutcome,
    now: &str,
) -> Result<(Task, TaskResult)> {
    db.with_tx(|tx| {
        let task = transition(tx, id, outcome.status(), now)?;
        let result = match outcome {
            TaskOutcome::Completed(payload) => {
                let body = serde_json::to_string(payload)?;
                result_repo::insert_in(tx, id, &body, "", now)?
            }
            TaskOutcome::Failed(reason) => result_repo::insert_in(tx, id, "", reason, now)?,
        };
        Ok((task, result))
    })
}

/// Most recent task matching the filter, by end_time.
pub fn find_latest(
    db: &Database,
    user_id: &str,
    credential_id: &str,
    task_type: &str,
    status: TaskStatus,
) -> std::result::Result<Option<Task>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE user_id = ?1 AND credential_id = ?2 AND task_type = ?3 AND status = ?4
             ORDER BY end_time DESC, rowid DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            params![user_id, credential_id, task_type, status.as_str()],
            Task::from_row,
        )?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
