//! Queued tasks driven through the worker against a mocked AWS account

mod common;

use std::time::Duration;

use common::{Fixture, instance};
use nimbus_cloud_aws::mock::MockConnector;
use nimbus_controlplane::db::task_repo;
use nimbus_controlplane::service::TaskSubmission;
use nimbus_controlplane::{
    ControlPlaneError, Processed, SqliteQueue, TaskQueue, TaskStatus, db,
};

fn submission(credential_id: &str, task_type: &str, parameters: &str) -> TaskSubmission {
    TaskSubmission {
        credential_id: credential_id.to_string(),
        task_type: task_type.to_string(),
        name: format!("{} task", task_type),
        parameters: parameters.to_string(),
    }
}

/// Pop the next id the way the run loop does and process it
async fn drain_one(fx: &Fixture) -> Processed {
    let delivery = fx
        .queue
        .pop(Duration::from_millis(100))
        .await
        .unwrap()
        .expect("a queued task");
    let processed = fx.worker().process(&delivery.task_id).await.unwrap();
    fx.queue.ack(&delivery).await.unwrap();
    processed
}

#[tokio::test]
async fn test_enumerate_partial_success() {
    let fx = Fixture::new(
        MockConnector::new()
            .with_instance("us-east-1", instance("i-a"))
            .fail("describe_instances", Some("us-west-2"), "UnauthorizedOperation"),
    );
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "AWS");

    let submitted = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&cred.id, "enumerate", r#"{"resource_type":"ec2"}"#))
        .await
        .unwrap();
    assert!(submitted.queue_warning.is_none());
    assert_eq!(submitted.task.status, TaskStatus::Pending);

    assert_eq!(drain_one(&fx).await, Processed::Finished(TaskStatus::Completed));

    let tasks = fx.plane.tasks();
    let task = tasks.get_task(&alice.id, &submitted.task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(!task.start_time.is_empty());
    assert!(task.end_time >= task.start_time);

    let results = tasks.list_results(&alice.id, &task.id).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    let payload = results[0].payload().unwrap();
    let instances = payload["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["instanceId"], "i-a");
    assert_eq!(instances[0]["region"], "us-east-1");
    let errors = payload["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("EC2 (us-west-2): "));
}

#[tokio::test]
async fn test_unknown_provider_fails_task() {
    let fx = Fixture::new(MockConnector::new());
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "Oracle");

    let submitted = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&cred.id, "enumerate", r#"{"resource_type":"ec2"}"#))
        .await
        .unwrap();
    assert_eq!(drain_one(&fx).await, Processed::Finished(TaskStatus::Failed));

    let task = fx.plane.tasks().get_task(&alice.id, &submitted.task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    // went through running on the way
    assert!(!task.start_time.is_empty());

    let results = fx.plane.tasks().list_results(&alice.id, &task.id).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error, "Failed to create cloud provider");
    assert_eq!(results[0].result, "");
}

#[tokio::test]
async fn test_dispatch_failures_are_recorded() {
    let fx = Fixture::new(MockConnector::new());
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "AWS");
    let tasks = fx.plane.tasks();

    for (task_type, params, reason) in [
        ("exfil", "{}", "Unsupported task type"),
        ("enumerate", "not json", "Invalid parameters"),
        ("enumerate", r#"{"resource_type":7}"#, "Invalid resource type"),
        ("operate", r#"{"resource_type":"ec2"}"#, "Invalid parameters"),
    ] {
        let submitted = tasks
            .submit_task(&alice.id, &submission(&cred.id, task_type, params))
            .await
            .unwrap();
        assert_eq!(drain_one(&fx).await, Processed::Finished(TaskStatus::Failed));

        let results = tasks.list_results(&alice.id, &submitted.task.id).unwrap();
        assert_eq!(results[0].error, reason, "{} {}", task_type, params);
    }
}

#[tokio::test]
async fn test_foreign_credential_is_not_found() {
    let fx = Fixture::new(MockConnector::new());
    let alice = fx.user("alice");
    let bob = fx.user("bob");
    let bobs = fx.credential(&bob, "AWS");

    let err = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&bobs.id, "escalate", "{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::NotFound(_)));
    assert!(fx.plane.tasks().list_tasks(&alice.id).unwrap().is_empty());
    assert!(fx.queue.is_empty().await);
}

#[tokio::test]
async fn test_submit_keeps_parameter_bytes() {
    let fx = Fixture::new(MockConnector::new());
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "AWS");

    let raw = "{ \"resource_type\" :\"vpc\" }";
    let submitted = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&cred.id, "enumerate", raw))
        .await
        .unwrap();
    let task = fx.plane.tasks().get_task(&alice.id, &submitted.task.id).unwrap();
    assert_eq!(task.parameters, raw);

    let empty = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&cred.id, "takeover", ""))
        .await
        .unwrap();
    assert_eq!(empty.task.parameters, "{}");
}

#[tokio::test]
async fn test_missing_queue_leaves_task_pending() {
    let fx = Fixture::without_queue(MockConnector::new());
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "AWS");

    let submitted = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&cred.id, "escalate", "{}"))
        .await
        .unwrap();
    assert!(submitted.queue_warning.is_some());
    let task = fx.plane.tasks().get_task(&alice.id, &submitted.task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    // still processable out of band
    let processed = fx.worker().process(&task.id).await.unwrap();
    assert_eq!(processed, Processed::Finished(TaskStatus::Completed));
}

#[tokio::test]
async fn test_redelivered_task_ends_terminal_once() {
    let fx = Fixture::new(MockConnector::new().with_current_user(Ok("deployer")));
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "AWS");
    let queue = SqliteQueue::new(fx.plane.db.clone()).with_lease(Duration::from_millis(100));

    let task = task_repo::create(
        &fx.plane.db,
        &task_repo::NewTask {
            user_id: &alice.id,
            credential_id: &cred.id,
            task_type: "escalate",
            name: "probe",
            parameters: "{}",
        },
        &db::now(),
    )
    .unwrap();
    queue.push(&task.id).await.unwrap();

    // first pass crashes after moving the task to running, never acks
    let first = queue.pop(Duration::from_millis(50)).await.unwrap().unwrap();
    let started = task_repo::update_status(&fx.plane.db, &first.task_id, TaskStatus::Running, &db::now())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = queue.pop(Duration::from_millis(200)).await.unwrap().unwrap();
    assert_eq!(second.task_id, task.id);
    assert_eq!(second.attempt, 2);

    let worker = fx.worker();
    assert_eq!(
        worker.process(&second.task_id).await.unwrap(),
        Processed::Finished(TaskStatus::Completed)
    );
    queue.ack(&second).await.unwrap();

    // a stray third delivery is skipped
    assert_eq!(
        worker.process(&task.id).await.unwrap(),
        Processed::Skipped(TaskStatus::Completed)
    );

    let done = fx.plane.tasks().get_task(&alice.id, &task.id).unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.start_time, started.start_time);
    assert_eq!(fx.plane.tasks().list_results(&alice.id, &task.id).unwrap().len(), 1);
    assert_eq!(queue.len().unwrap(), 0);
}

#[tokio::test]
async fn test_stale_id_is_dropped() {
    let fx = Fixture::new(MockConnector::new());
    assert_eq!(
        fx.worker().process("no-such-task").await.unwrap(),
        Processed::Missing
    );
}

#[tokio::test]
async fn test_run_loop_until_shutdown() {
    let fx = Fixture::new(MockConnector::new().with_instance("eu-west-1", instance("i-eu")));
    let alice = fx.user("alice");
    let cred = fx.credential(&alice, "AWS");

    let (tx, rx) = tokio::sync::watch::channel(false);
    let worker = fx.worker();
    let handle = tokio::spawn(async move { worker.run(rx).await });

    let submitted = fx
        .plane
        .tasks()
        .submit_task(&alice.id, &submission(&cred.id, "enumerate", r#"{"resource_type":"ec2"}"#))
        .await
        .unwrap();

    let tasks = fx.plane.tasks();
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let task = tasks.get_task(&alice.id, &submitted.task.id).unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(fx.queue.is_empty().await);
}
