//! Typed form of a task's parameter blob
//!
//! Parameters travel as opaque JSON text; they get a meaning only here, at
//! dispatch time. The worker and the inline path both go through
//! [`Operation`], so a stored task and an inline call run identically.

use nimbus_cloud::{CloudProvider, OperateRequest};
use serde_json::{Map, Value};

use crate::error::{ControlPlaneError, Result};
use crate::model::TaskType;

pub const INVALID_PARAMETERS: &str = "Invalid parameters";
pub const INVALID_RESOURCE_TYPE: &str = "Invalid resource type";
pub const UNSUPPORTED_TASK_TYPE: &str = "Unsupported task type";

/// One adapter call with validated arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Enumerate { resource_type: String },
    Escalate,
    Operate(OperateRequest),
    Takeover,
}

fn required_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

impl Operation {
    /// Parse raw parameter text for a task type
    pub fn from_task(task_type: &str, parameters: &str) -> Result<Self> {
        let params: Map<String, Value> = serde_json::from_str(parameters)
            .map_err(|_| ControlPlaneError::BadRequest(INVALID_PARAMETERS.to_string()))?;
        Self::from_params(task_type, params)
    }

    pub fn from_params(task_type: &str, params: Map<String, Value>) -> Result<Self> {
        match task_type.parse::<TaskType>()? {
            TaskType::Enumerate => {
                let resource_type = required_str(&params, "resource_type").ok_or_else(|| {
                    ControlPlaneError::BadRequest(INVALID_RESOURCE_TYPE.to_string())
                })?;
                Ok(Operation::Enumerate { resource_type })
            }
            TaskType::Escalate => Ok(Operation::Escalate),
            TaskType::Operate => {
                let (Some(resource_type), Some(action), Some(resource_id)) = (
                    required_str(&params, "resource_type"),
                    required_str(&params, "action"),
                    required_str(&params, "resource_id"),
                ) else {
                    return Err(ControlPlaneError::BadRequest(INVALID_PARAMETERS.to_string()));
                };
                Ok(Operation::Operate(OperateRequest {
                    resource_type,
                    action,
                    resource_id,
                    params,
                }))
            }
            TaskType::Takeover => Ok(Operation::Takeover),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Operation::Enumerate { .. } => TaskType::Enumerate,
            Operation::Escalate => TaskType::Escalate,
            Operation::Operate(_) => TaskType::Operate,
            Operation::Takeover => TaskType::Takeover,
        }
    }

    /// Parameter object recorded for an inline run
    pub fn parameters(&self, region: Option<&str>) -> Value {
        let mut params = match self {
            Operation::Enumerate { resource_type } => {
                let mut map = Map::new();
                map.insert("resource_type".into(), Value::String(resource_type.clone()));
                map
            }
            Operation::Operate(request) => {
                let mut map = request.params.clone();
                map.insert("resource_type".into(), Value::String(request.resource_type.clone()));
                map.insert("action".into(), Value::String(request.action.clone()));
                map.insert("resource_id".into(), Value::String(request.resource_id.clone()));
                map
            }
            Operation::Escalate | Operation::Takeover => Map::new(),
        };
        if let Some(region) = region {
            params.insert("region".into(), Value::String(region.to_string()));
        }
        Value::Object(params)
    }

    /// Invoke the adapter and serialize its answer
    pub async fn run(&self, adapter: &dyn CloudProvider) -> nimbus_cloud::Result<Value> {
        let payload = match self {
            Operation::Enumerate { resource_type } => {
                serde_json::to_value(adapter.enumerate(resource_type).await?)?
            }
            Operation::Escalate => serde_json::to_value(adapter.escalate().await?)?,
            Operation::Operate(request) => adapter.operate(request).await?,
            Operation::Takeover => serde_json::to_value(adapter.takeover().await?)?,
        };
        Ok(payload)
    }
}

/// Failure text recorded on a task that could not be dispatched
pub fn failure_reason(err: &ControlPlaneError) -> String {
    match err {
        ControlPlaneError::UnsupportedTaskType(_) => UNSUPPORTED_TASK_TYPE.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_requires_string_resource_type() {
        assert_eq!(
            Operation::from_task("enumerate", r#"{"resource_type":"ec2"}"#).unwrap(),
            Operation::Enumerate {
                resource_type: "ec2".into()
            }
        );

        let err = Operation::from_task("enumerate", r#"{"resource_type":3}"#).unwrap_err();
        assert_eq!(failure_reason(&err), INVALID_RESOURCE_TYPE);
        let err = Operation::from_task("enumerate", "{}").unwrap_err();
        assert_eq!(failure_reason(&err), INVALID_RESOURCE_TYPE);
    }

    #[test]
    fn test_non_object_parameters_are_invalid() {
        for raw in ["", "not json", "[1,2]", "\"ec2\"", "null"] {
            let err = Operation::from_task("enumerate", raw).unwrap_err();
            assert_eq!(failure_reason(&err), INVALID_PARAMETERS, "input {:?}", raw);
        }
    }

    #[test]
    fn test_operate_keeps_full_parameter_map() {
        let op = Operation::from_task(
            "operate",
            r#"{"resource_type":"ec2","action":"execute_command","resource_id":"i-1","command":"id"}"#,
        )
        .unwrap();
        let Operation::Operate(request) = op else {
            panic!("expected operate");
        };
        assert_eq!(request.action, "execute_command");
        assert_eq!(request.param_str("command"), Some("id"));
        assert_eq!(request.param_str("resource_id"), Some("i-1"));
    }

    #[test]
    fn test_operate_missing_keys() {
        let err = Operation::from_task("operate", r#"{"resource_type":"ec2","action":"x"}"#)
            .unwrap_err();
        assert_eq!(failure_reason(&err), INVALID_PARAMETERS);
    }

    #[test]
    fn test_unknown_task_type() {
        let err = Operation::from_task("exfil", "{}").unwrap_err();
        assert_eq!(failure_reason(&err), UNSUPPORTED_TASK_TYPE);
    }

    #[test]
    fn test_inline_parameters_record_region() {
        let op = Operation::Enumerate {
            resource_type: "s3".into(),
        };
        assert_eq!(
            op.parameters(Some("eu-west-1")),
            serde_json::json!({"resource_type": "s3", "region": "eu-west-1"})
        );
        assert_eq!(Operation::Takeover.parameters(None), serde_json::json!({}));

        let op = Operation::Operate(
            OperateRequest::new("s3", "download", "bucket").with_param("key", "a.txt".into()),
        );
        let params = op.parameters(None);
        assert_eq!(params["key"], "a.txt");
        assert_eq!(params["resource_id"], "bucket");
        let reparsed =
            Operation::from_params("operate", params.as_object().unwrap().clone()).unwrap();
        assert_eq!(reparsed.task_type(), TaskType::Operate);
        assert_eq!(reparsed.parameters(None), params);
    }
}
