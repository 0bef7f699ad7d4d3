//! `ec2.execute_command` over SSM
//!
//! The instance must be running and carry an instance profile that lets the
//! SSM agent register. When it has none, a well-known role and profile pair
//! is created (or reused), the managed SSM core policy attached, and the
//! profile associated with the instance before the command is sent.

use crate::client::AwsApi;
use crate::error::{Result, within};
use nimbus_cloud::RetryConfig;
use serde_json::{Map, Value, json};
use std::time::Duration;

pub const SSM_ROLE_NAME: &str = "aws-key-tools-role";
pub const SSM_PROFILE_NAME: &str = "aws-key-tools-profile";
pub const SSM_MANAGED_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";
pub const RUN_SHELL_DOCUMENT: &str = "AWS-RunShellScript";

pub const EC2_TRUST_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Principal": { "Service": "ec2.amazonaws.com" },
      "Action": "sts:AssumeRole"
    }
  ]
}"#;

/// Waits of the execute ceremony
#[derive(Debug, Clone)]
pub struct CeremonyTimings {
    /// After creating the role/profile pair
    pub settle: Duration,
    /// `GetInstanceProfile` polling
    pub profile_retry: RetryConfig,
    /// After the profile becomes visible, before association
    pub propagation: Duration,
    /// Between `SendCommand` and `GetCommandInvocation`
    pub result_wait: Duration,
    pub call_deadline: Duration,
    pub command_deadline: Duration,
}

impl Default for CeremonyTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            profile_retry: RetryConfig::fixed(3, Duration::from_secs(2)),
            propagation: Duration::from_secs(10),
            result_wait: Duration::from_secs(3),
            call_deadline: Duration::from_secs(10),
            command_deadline: Duration::from_secs(30),
        }
    }
}

impl CeremonyTimings {
    /// Longest one ceremony can run when every call hits its deadline
    pub fn worst_case(&self) -> Duration {
        // describe, six IAM setup calls, associate, get invocation
        const FIXED_CALLS: u32 = 9;
        let retry = &self.profile_retry;
        let profile_polls = retry.max_attempts.max(1);
        let retry_sleeps = retry.max_delay * (profile_polls - 1);

        self.call_deadline * (FIXED_CALLS + profile_polls)
            + self.settle
            + retry_sleeps
            + self.propagation
            + self.command_deadline
            + self.result_wait
    }
}

/// Accumulated `executionSteps`
#[derive(Debug, Default)]
pub struct ExecutionTrace {
    steps: Vec<String>,
}

impl ExecutionTrace {
    pub fn step(&mut self, step: impl Into<String>) {
        let step = step.into();
        tracing::debug!(step = %step, "execute_command");
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

const SEND_FAILURE_HINTS: [&str; 7] = [
    "Possible causes:",
    "1. SSM Agent is not installed or not running",
    "2. The instance has no route to the SSM endpoints",
    "3. The instance profile has not taken effect yet",
    "4. The security group blocks SSM traffic",
    "5. The instance is not running",
    "Retry after a few minutes once the instance profile has propagated",
];

struct Failure<'a> {
    message: &'a str,
    instance_id: &'a str,
    command: Option<&'a str>,
    command_id: Option<&'a str>,
    error: String,
}

impl Failure<'_> {
    fn into_payload(self, trace: ExecutionTrace) -> Value {
        let mut payload = Map::new();
        payload.insert("message".into(), json!(self.message));
        payload.insert("instanceId".into(), json!(self.instance_id));
        if let Some(command_id) = self.command_id {
            payload.insert("commandId".into(), json!(command_id));
        }
        if let Some(command) = self.command {
            payload.insert("command".into(), json!(command));
        }
        payload.insert("status".into(), json!("failed"));
        payload.insert("error".into(), json!(self.error));
        payload.insert("executionSteps".into(), json!(trace.steps));
        Value::Object(payload)
    }
}

/// Run `command` on `instance_id`
///
/// Step failures come back as `status: "failed"` payloads with the trace so
/// far, not as errors.
pub async fn execute_command(
    api: &dyn AwsApi,
    instance_id: &str,
    command: &str,
    timings: &CeremonyTimings,
) -> Result<Value> {
    let mut trace = ExecutionTrace::default();

    trace.step("Checking instance state");
    let lookup = within(
        timings.call_deadline,
        "describe instance",
        api.describe_instance(instance_id),
    )
    .await;
    let instance = match lookup {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            trace.step("Instance not found");
            return Ok(Failure {
                message: "Instance not found",
                instance_id,
                command: None,
                command_id: None,
                error: format!("instance {} does not exist in {}", instance_id, api.region()),
            }
            .into_payload(trace));
        }
        Err(err) => {
            trace.step(format!("Instance state check failed: {}", err));
            return Ok(Failure {
                message: "Failed to check instance status",
                instance_id,
                command: None,
                command_id: None,
                error: err.to_string(),
            }
            .into_payload(trace));
        }
    };

    if !instance.is_running() {
        trace.step(format!("Instance is not running, current state: {}", instance.state));
        return Ok(Failure {
            message: "Instance is not in running state",
            instance_id,
            command: None,
            command_id: None,
            error: format!("instance state is {}", instance.state),
        }
        .into_payload(trace));
    }
    trace.step("Instance is running");

    trace.step("Checking instance profile");
    let profile_attached = instance.iam_instance_profile.is_some();
    if let Err(err) = ensure_instance_profile(api, instance_id, profile_attached, timings).await {
        trace.step(format!("Instance profile setup failed: {}", err));
        return Ok(Failure {
            message: "Failed to check or create instance profile",
            instance_id,
            command: None,
            command_id: None,
            error: err.to_string(),
        }
        .into_payload(trace));
    }
    trace.step("Instance profile ready");

    trace.step("Sending command");
    let sent = within(
        timings.command_deadline,
        "send command",
        api.send_shell_command(instance_id, command),
    )
    .await;
    let command_id = match sent {
        Ok(id) => id,
        Err(err) => {
            trace.step(format!("Sending command failed: {}", err));
            for hint in SEND_FAILURE_HINTS {
                trace.step(hint);
            }
            return Ok(Failure {
                message: "Failed to send command",
                instance_id,
                command: Some(command),
                command_id: None,
                error: err.to_string(),
            }
            .into_payload(trace));
        }
    };
    trace.step(format!("Command sent, CommandId: {}", command_id));
    trace.step("Waiting for command output");

    tokio::time::sleep(timings.result_wait).await;

    trace.step("Fetching command invocation");
    let fetched = within(
        timings.call_deadline,
        "get command invocation",
        api.get_command_invocation(&command_id, instance_id),
    )
    .await;
    let invocation = match fetched {
        Ok(invocation) => invocation,
        Err(err) => {
            trace.step(format!("Fetching command invocation failed: {}", err));
            let mut payload = Failure {
                message: "Command sent but failed to get result",
                instance_id,
                command: Some(command),
                command_id: Some(&command_id),
                error: err.to_string(),
            }
            .into_payload(trace);
            payload["note"] = json!(
                "Failed to get command execution result. Use the command ID to check status later."
            );
            return Ok(payload);
        }
    };

    trace.step("Command output:");
    trace.step(invocation.stdout.clone());
    if !invocation.stderr.is_empty() {
        trace.step("Error output:");
        trace.step(invocation.stderr.clone());
    }

    let mut payload = Map::new();
    payload.insert("message".into(), json!("Command executed successfully"));
    payload.insert("instanceId".into(), json!(instance_id));
    payload.insert("commandId".into(), json!(command_id));
    payload.insert("command".into(), json!(command));
    payload.insert("status".into(), json!(invocation.status));
    payload.insert("stdout".into(), json!(invocation.stdout));
    if !invocation.stderr.is_empty() {
        payload.insert("stderr".into(), json!(invocation.stderr));
    }
    if let Some(start) = invocation.start_time {
        payload.insert("startTime".into(), json!(start));
    }
    if let Some(end) = invocation.end_time {
        payload.insert("endTime".into(), json!(end));
    }
    payload.insert("executionSteps".into(), json!(trace.steps));
    Ok(Value::Object(payload))
}

/// Create or reuse the SSM role/profile pair and associate it
async fn ensure_instance_profile(
    api: &dyn AwsApi,
    instance_id: &str,
    already_attached: bool,
    timings: &CeremonyTimings,
) -> Result<()> {
    if already_attached {
        return Ok(());
    }
    let deadline = timings.call_deadline;

    let roles = within(deadline, "list roles", api.list_roles())
        .await
        .unwrap_or_default();
    if !roles.iter().any(|r| r.role_name == SSM_ROLE_NAME) {
        within(deadline, "create role", api.create_role(SSM_ROLE_NAME, EC2_TRUST_POLICY)).await?;
        within(
            deadline,
            "attach policy",
            api.attach_role_policy(SSM_ROLE_NAME, SSM_MANAGED_POLICY_ARN),
        )
        .await?;
    }

    let profiles = within(deadline, "list instance profiles", api.list_instance_profiles())
        .await
        .unwrap_or_default();
    if !profiles.iter().any(|p| p == SSM_PROFILE_NAME) {
        within(
            deadline,
            "create instance profile",
            api.create_instance_profile(SSM_PROFILE_NAME),
        )
        .await?;
        within(
            deadline,
            "add role to instance profile",
            api.add_role_to_instance_profile(SSM_PROFILE_NAME, SSM_ROLE_NAME),
        )
        .await?;
    }

    tokio::time::sleep(timings.settle).await;

    let retry = &timings.profile_retry;
    let mut attempt = 0;
    loop {
        match within(
            deadline,
            "get instance profile",
            api.get_instance_profile(SSM_PROFILE_NAME),
        )
        .await
        {
            Ok(()) => break,
            Err(err) if attempt + 1 >= retry.max_attempts => return Err(err),
            Err(err) => {
                tracing::debug!(attempt, error = %err, "instance profile not visible yet");
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }

    tokio::time::sleep(timings.propagation).await;

    within(
        deadline,
        "associate instance profile",
        api.associate_instance_profile(instance_id, SSM_PROFILE_NAME),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AwsConnector;
    use crate::mock::MockConnector;
    use crate::model::{CommandInvocation, Ec2Instance};

    fn instance(id: &str, state: &str, profile: Option<&str>) -> Ec2Instance {
        Ec2Instance {
            instance_id: id.to_string(),
            state: state.to_string(),
            iam_instance_profile: profile.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_profile_is_created_and_associated() {
        let mock = MockConnector::new()
            .with_instance("us-east-1", instance("i-1", "running", None))
            .with_invocation(CommandInvocation {
                status: "Success".into(),
                stdout: "uid=0(root)\n".into(),
                stderr: String::new(),
                start_time: Some("2024-01-01T00:00:00Z".into()),
                end_time: None,
            });
        let api = mock.connect("us-east-1").await.unwrap();

        let started = tokio::time::Instant::now();
        let value = execute_command(api.as_ref(), "i-1", "id", &CeremonyTimings::default())
            .await
            .unwrap();

        assert_eq!(value["status"], "Success");
        assert_eq!(value["stdout"], "uid=0(root)\n");
        assert_eq!(value["commandId"], "cmd-0001");
        assert!(value.get("stderr").is_none());
        assert!(value.get("endTime").is_none());
        // settle 5s + propagation 10s + result wait 3s
        assert!(started.elapsed() >= Duration::from_secs(18));
        assert_eq!(
            mock.journal(),
            vec![
                "create_role aws-key-tools-role",
                "attach_role_policy aws-key-tools-role arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore",
                "create_instance_profile aws-key-tools-profile",
                "add_role_to_instance_profile aws-key-tools-profile aws-key-tools-role",
                "get_instance_profile aws-key-tools-profile",
                "associate_instance_profile i-1 aws-key-tools-profile",
                "send_shell_command i-1 id",
            ]
        );
    }

    #[test]
    fn test_worst_case_covers_every_wait() {
        let timings = CeremonyTimings::default();
        // 12 calls x 10s + settle 5s + 2 retry sleeps x 2s + 10s + 30s + 3s
        assert_eq!(timings.worst_case(), Duration::from_secs(172));
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_role_and_profile_are_reused() {
        let mock = MockConnector::new()
            .with_instance("us-east-1", instance("i-1", "running", None))
            .with_role(SSM_ROLE_NAME)
            .with_instance_profile(SSM_PROFILE_NAME);
        let api = mock.connect("us-east-1").await.unwrap();

        execute_command(api.as_ref(), "i-1", "id", &CeremonyTimings::default())
            .await
            .unwrap();
        assert!(!mock.journal().iter().any(|e| e.starts_with("create_")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_instance_fails_with_trace() {
        let mock = MockConnector::new().with_instance("us-east-1", instance("i-2", "stopped", None));
        let api = mock.connect("us-east-1").await.unwrap();

        let value = execute_command(api.as_ref(), "i-2", "id", &CeremonyTimings::default())
            .await
            .unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["message"], "Instance is not in running state");
        assert_eq!(value["executionSteps"].as_array().unwrap().len(), 2);
        assert!(mock.journal().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_instance_fails() {
        let mock = MockConnector::new();
        let api = mock.connect("us-east-1").await.unwrap();
        let value = execute_command(api.as_ref(), "i-404", "id", &CeremonyTimings::default())
            .await
            .unwrap();
        assert_eq!(value["message"], "Instance not found");
        assert_eq!(value["status"], "failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_never_visible_gives_up_after_three_attempts() {
        let mock = MockConnector::new()
            .with_instance("us-east-1", instance("i-1", "running", None))
            .fail("get_instance_profile", None, "NoSuchEntity");
        let api = mock.connect("us-east-1").await.unwrap();

        let value = execute_command(api.as_ref(), "i-1", "id", &CeremonyTimings::default())
            .await
            .unwrap();
        assert_eq!(value["message"], "Failed to check or create instance profile");
        assert!(value["error"].as_str().unwrap().contains("NoSuchEntity"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_carries_hints() {
        let mock = MockConnector::new()
            .with_instance("us-east-1", instance("i-1", "running", Some("arn:profile")))
            .fail("send_shell_command", None, "InvalidInstanceId");
        let api = mock.connect("us-east-1").await.unwrap();

        let value = execute_command(api.as_ref(), "i-1", "id", &CeremonyTimings::default())
            .await
            .unwrap();
        assert_eq!(value["message"], "Failed to send command");
        assert_eq!(value["command"], "id");
        let steps = value["executionSteps"].as_array().unwrap();
        assert_eq!(
            steps.last().and_then(|s| s.as_str()),
            Some(SEND_FAILURE_HINTS[6])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invocation_failure_keeps_command_id() {
        let mock = MockConnector::new()
            .with_instance("us-east-1", instance("i-1", "running", Some("arn:profile")))
            .fail("get_command_invocation", None, "InvocationDoesNotExist");
        let api = mock.connect("us-east-1").await.unwrap();

        let value = execute_command(api.as_ref(), "i-1", "id", &CeremonyTimings::default())
            .await
            .unwrap();
        assert_eq!(value["message"], "Command sent but failed to get result");
        assert_eq!(value["commandId"], "cmd-0001");
        assert!(value["note"].is_string());
    }
}
