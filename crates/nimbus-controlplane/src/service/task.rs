//! Task submission, inline execution and history
//!
//! Two ways in:
//!
//! ```text
//! submit_task ──► tasks(pending) ──► queue ──► Worker
//!
//! run_inline  ──► tasks(running) ──► adapter ──► tasks(completed|failed)
//!                                    (in-request)
//! ```
//!
//! Both leave a task and a result row behind, so history and the stats
//! endpoints see inline calls the same as queued ones.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::db::{self, Database, result_repo, task_repo};
use crate::error::{ControlPlaneError, Result};
use crate::model::{Task, TaskOutcome, TaskResult, TaskStatus, TaskType};
use crate::operation::Operation;
use crate::provider::ProviderFactory;
use crate::queue::TaskQueue;
use crate::service::credential::CredentialService;
use crate::worker::ADAPTER_INIT_FAILED;

pub const REQUEST_CANCELLED: &str = "Request cancelled";

/// Accepts the parameter blob either as JSON text or as an inline JSON value
fn parameters_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSubmission {
    pub credential_id: String,
    pub task_type: String,
    pub name: String,
    #[serde(default, deserialize_with = "parameters_text")]
    pub parameters: String,
}

/// A created task and, when it could not be queued, why
#[derive(Debug, Clone)]
pub struct Submission {
    pub task: Task,
    pub queue_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineOutcome {
    pub task_id: String,
    pub credential_name: String,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastEnumeration {
    pub credential_name: String,
    pub task_id: String,
    pub result: serde_json::Value,
    pub timestamp: String,
}

/// Fails the inline task if the request future is dropped mid-call
struct InlineGuard {
    db: Database,
    task_id: String,
    armed: bool,
}

impl InlineGuard {
    fn finish(mut self, outcome: &TaskOutcome) -> Result<()> {
        self.armed = false;
        task_repo::finish(&self.db, &self.task_id, outcome, &db::now())?;
        Ok(())
    }
}

impl Drop for InlineGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let outcome = TaskOutcome::Failed(REQUEST_CANCELLED.to_string());
        if let Err(e) = task_repo::finish(&self.db, &self.task_id, &outcome, &db::now()) {
            tracing::warn!(task_id = %self.task_id, error = %e, "could not fail cancelled inline task");
        } else {
            tracing::info!(task_id = %self.task_id, "inline task cancelled with its request");
        }
    }
}

#[derive(Clone)]
pub struct TaskService {
    db: Database,
    credentials: CredentialService,
    queue: Option<Arc<dyn TaskQueue>>,
    factory: Arc<dyn ProviderFactory>,
}

impl TaskService {
    pub fn new(
        db: Database,
        credentials: CredentialService,
        queue: Option<Arc<dyn TaskQueue>>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            db,
            credentials,
            queue,
            factory,
        }
    }

    /// Create a pending task and try to queue it
    ///
    /// The task exists once this returns `Ok`, queued or not.
    pub async fn submit_task(&self, user_id: &str, input: &TaskSubmission) -> Result<Submission> {
        if input.credential_id.trim().is_empty()
            || input.task_type.trim().is_empty()
            || input.name.trim().is_empty()
        {
            return Err(ControlPlaneError::BadRequest(
                "credential_id, task_type and name are required".to_string(),
            ));
        }
        let parameters = if input.parameters.trim().is_empty() {
            "{}"
        } else {
            input.parameters.as_str()
        };

        let task = task_repo::create(
            &self.db,
            &task_repo::NewTask {
                user_id,
                credential_id: &input.credential_id,
                task_type: &input.task_type,
                name: input.name.trim(),
                parameters,
            },
            &db::now(),
        )?;
        tracing::info!(task_id = %task.id, user_id, task_type = %task.task_type, "task created");

        let queued = match &self.queue {
            Some(queue) => queue.push(&task.id).await,
            None => Err(ControlPlaneError::QueueUnavailable(
                "no task queue configured".to_string(),
            )),
        };
        let queue_warning = match queued {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "task left pending");
                Some(e.to_string())
            }
        };

        Ok(Submission {
            task,
            queue_warning,
        })
    }

    /// Run one operation in-request and record it as a finished task
    ///
    /// A non-empty `region` overrides the credential's region for this call.
    pub async fn run_inline(
        &self,
        user_id: &str,
        credential_id: &str,
        region: Option<&str>,
        operation: Operation,
    ) -> Result<InlineOutcome> {
        let (credential, keys) = self.credentials.resolve(user_id, credential_id, region)?;
        let task_type = operation.task_type();
        let parameters = operation.parameters(region.filter(|r| !r.trim().is_empty()));

        let task = task_repo::create(
            &self.db,
            &task_repo::NewTask {
                user_id,
                credential_id,
                task_type: task_type.as_str(),
                name: &format!("inline {}", task_type),
                parameters: &parameters.to_string(),
            },
            &db::now(),
        )?;
        task_repo::update_status(&self.db, &task.id, TaskStatus::Running, &db::now())?;
        let guard = InlineGuard {
            db: self.db.clone(),
            task_id: task.id.clone(),
            armed: true,
        };

        tracing::info!(
            task_id = %task.id,
            user_id,
            provider = %credential.provider,
            %task_type,
            "running inline task"
        );

        let adapter = match self.factory.build(&credential.provider, keys).await {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "error creating cloud provider");
                guard.finish(&TaskOutcome::Failed(ADAPTER_INIT_FAILED.to_string()))?;
                return Err(e.into());
            }
        };

        match operation.run(adapter.as_ref()).await {
            Ok(result) => {
                guard.finish(&TaskOutcome::Completed(result.clone()))?;
                Ok(InlineOutcome {
                    task_id: task.id,
                    credential_name: credential.name,
                    result,
                })
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "inline task failed");
                guard.finish(&TaskOutcome::Failed(e.to_string()))?;
                Err(e.into())
            }
        }
    }

    pub fn get_task(&self, user_id: &str, task_id: &str) -> Result<Task> {
        task_repo::get_for_user(&self.db, task_id, user_id)?
            .ok_or_else(|| ControlPlaneError::not_found("Task"))
    }

    pub fn list_results(&self, user_id: &str, task_id: &str) -> Result<Vec<TaskResult>> {
        let task = self.get_task(user_id, task_id)?;
        Ok(result_repo::list_for_task(&self.db, &task.id)?)
    }

    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        Ok(task_repo::list_for_user(&self.db, user_id)?)
    }

    /// Payload of the newest completed enumerate task for a credential
    pub fn fetch_last_enumeration(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<LastEnumeration> {
        let credential = self.credentials.get(user_id, credential_id)?;
        let task = task_repo::find_latest(
            &self.db,
            user_id,
            credential_id,
            TaskType::Enumerate.as_str(),
            TaskStatus::Completed,
        )?
        .ok_or_else(|| ControlPlaneError::NotFound("No enumeration task found".to_string()))?;
        let result = result_repo::latest_success(&self.db, &task.id)?
            .ok_or_else(|| ControlPlaneError::NotFound("Task result not found".to_string()))?;

        Ok(LastEnumeration {
            credential_name: credential.name,
            task_id: task.id,
            result: result.payload()?,
            timestamp: result.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_accept_text_or_object() {
        let text: TaskSubmission = serde_json::from_str(
            r#"{"credential_id":"c1","task_type":"enumerate","name":"n","parameters":"{\"resource_type\": \"ec2\"}"}"#,
        )
        .unwrap();
        assert_eq!(text.parameters, r#"{"resource_type": "ec2"}"#);

        let object: TaskSubmission = serde_json::from_str(
            r#"{"credential_id":"c1","task_type":"enumerate","name":"n","parameters":{"resource_type":"s3"}}"#,
        )
        .unwrap();
        assert_eq!(object.parameters, r#"{"resource_type":"s3"}"#);

        let missing: TaskSubmission =
            serde_json::from_str(r#"{"credential_id":"c1","task_type":"takeover","name":"n"}"#)
                .unwrap();
        assert_eq!(missing.parameters, "");
    }
}
