//! Aggregate queries behind the analysis endpoints.

use rusqlite::{Row, params};

use super::{Database, DatabaseError};

/// Task counts of one user by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

pub fn task_counts(db: &Database, user_id: &str) -> Result<TaskCounts, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM tasks WHERE user_id = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![user_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?))
        })?;

        let mut counts = TaskCounts::default();
        for row in rows {
            let (status, n) = row?;
            counts.total += n;
            match status.as_str() {
                "pending" => counts.pending = n,
                "running" => counts.running = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    })
}

/// A successful result joined with its task and credential.
#[derive(Debug, Clone)]
pub struct StoredFinding {
    pub task_id: String,
    pub task_type: String,
    pub credential_id: String,
    pub credential_name: String,
    pub provider: String,
    pub result: String,
    pub timestamp: String,
}

impl StoredFinding {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            task_type: row.get("task_type")?,
            credential_id: row.get("credential_id")?,
            credential_name: row.get("credential_name")?,
            provider: row.get("provider")?,
            result: row.get("result")?,
            timestamp: row.get("timestamp")?,
        })
    }

    pub fn payload(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.result).ok()
    }
}

/// Successful results of completed tasks of the given type, newest first.
pub fn successful_results(
    db: &Database,
    user_id: &str,
    task_type: &str,
    limit: u32,
) -> Result<Vec<StoredFinding>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT r.task_id, t.task_type, t.credential_id, c.name AS credential_name,
                    c.provider, r.result, r.timestamp
             FROM task_results r
             JOIN tasks t ON t.id = r.task_id
             JOIN credentials c ON c.id = t.credential_id
             WHERE t.user_id = ?1 AND t.task_type = ?2 AND t.status = 'completed'
                   AND r.error = ''
             ORDER BY r.timestamp DESC, r.rowid DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, task_type, limit], StoredFinding::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::task_repo;
    use crate::model::{TaskOutcome, TaskStatus};

    #[test]
    fn test_task_counts() {
        let db = task_repo::tests::seeded();
        let new = task_repo::tests::new_task("enumerate", "{}");
        let a = task_repo::create(&db, &new, "t0").unwrap();
        let b = task_repo::create(&db, &new, "t0").unwrap();
        task_repo::create(&db, &new, "t0").unwrap();

        task_repo::update_status(&db, &a.id, TaskStatus::Running, "t1").unwrap();
        task_repo::finish(&db, &a.id, &TaskOutcome::Completed(serde_json::json!({})), "t2")
            .unwrap();
        task_repo::update_status(&db, &b.id, TaskStatus::Running, "t1").unwrap();

        let counts = task_counts(&db, "user-alice").unwrap();
        assert_eq!(
            counts,
            TaskCounts {
                total: 3,
                pending: 1,
                running: 1,
                completed: 1,
                failed: 0,
            }
        );
        assert_eq!(task_counts(&db, "user-bob").unwrap(), TaskCounts::default());
    }

    #[test]
    fn test_successful_results_join_credential() {
        let db = task_repo::tests::seeded();
        let task = task_repo::create(&db, &task_repo::tests::new_task("escalate", "{}"), "t0")
            .unwrap();
        task_repo::update_status(&db, &task.id, TaskStatus::Running, "t1").unwrap();
        task_repo::finish(
            &db,
            &task.id,
            &TaskOutcome::Completed(serde_json::json!({"riskLevel": "Medium"})),
            "t2",
        )
        .unwrap();

        let rows = successful_results(&db, "user-alice", "escalate", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provider, "AWS");
        assert_eq!(rows[0].credential_name, "cred c1");
        assert_eq!(rows[0].payload().unwrap()["riskLevel"], "Medium");
        assert!(successful_results(&db, "user-alice", "takeover", 10).unwrap().is_empty());
    }
}
