//! Typed AWS records
//!
//! These are what the region-scoped client returns. They serialize with
//! the camelCase field names the enumeration payload exposes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ec2Instance {
    pub instance_id: String,
    pub instance_type: String,
    pub state: String,
    pub public_ip: String,
    pub private_ip: String,
    pub tags: BTreeMap<String, String>,
    /// ARN of the attached instance profile
    #[serde(skip)]
    pub iam_instance_profile: Option<String>,
}

impl Ec2Instance {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    pub key: String,
    pub size: i64,
    pub last_modified: String,
    pub e_tag: String,
}

/// One `ListObjectsV2` page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub objects: Vec<S3Object>,
    pub truncated: bool,
    pub next_token: Option<String>,
}

/// Bucket as reported by enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    pub bucket_name: String,
    pub creation_date: String,
    pub region: String,
    pub objects: Vec<S3Object>,
    pub more_objects: bool,
}

impl BucketRecord {
    /// Placeholder naming how many buckets were left out
    pub fn overflow(skipped: usize) -> Self {
        Self {
            bucket_name: format!("... 还有 {} 个存储桶未显示", skipped),
            creation_date: String::new(),
            region: String::new(),
            objects: Vec::new(),
            more_objects: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamUser {
    pub user_name: String,
    pub user_id: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamRole {
    pub role_name: String,
    pub role_id: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub vpc_id: String,
    pub cidr_block: String,
    pub state: String,
    pub is_default: bool,
    pub tags: BTreeMap<String, String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub destination_cidr_block: Option<String>,
    pub gateway_id: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: String,
    pub routes: Vec<Route>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub load_balancer_name: String,
    pub load_balancer_arn: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub dns_name: Option<String>,
    pub state: Option<String>,
    pub availability_zones: Vec<String>,
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksCluster {
    pub name: String,
    pub arn: String,
    pub version: String,
    pub status: String,
    pub endpoint: Option<String>,
    pub role_arn: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KmsKey {
    pub key_id: String,
    pub arn: String,
    pub creation_date: Option<String>,
    pub description: String,
    pub key_state: String,
    pub key_usage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbInstance {
    pub db_instance_identifier: String,
    pub db_instance_arn: String,
    pub db_instance_class: String,
    pub engine: String,
    pub engine_version: String,
    pub status: String,
    pub endpoint: Option<String>,
    pub allocated_storage: Option<i32>,
    #[serde(rename = "multiAZ")]
    pub multi_az: bool,
    pub backup_retention_period: Option<i32>,
}

/// `GetCommandInvocation` answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandInvocation {
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// `GetCallerIdentity` answer
#[derive(Debug, Clone, PartialEq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

/// Temporary credentials from `GetFederationToken`
#[derive(Debug, Clone, PartialEq)]
pub struct FederationCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_record_hides_profile_and_uses_camel_case() {
        let instance = Ec2Instance {
            instance_id: "i-1".into(),
            state: "running".into(),
            iam_instance_profile: Some("arn:aws:iam::1:instance-profile/p".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&instance).unwrap();
        assert_eq!(value["instanceId"], "i-1");
        assert!(value.get("iamInstanceProfile").is_none());
        assert!(instance.is_running());
    }

    #[test]
    fn test_overflow_bucket_names_skipped_count() {
        let value = serde_json::to_value(BucketRecord::overflow(10)).unwrap();
        assert_eq!(value["bucketName"], "... 还有 10 个存储桶未显示");
        assert_eq!(value["moreObjects"], false);
        assert_eq!(value["objects"], serde_json::json!([]));
    }

    #[test]
    fn test_db_instance_multi_az_key() {
        let db = DbInstance {
            db_instance_identifier: "db".into(),
            db_instance_arn: "arn".into(),
            db_instance_class: "db.t3.micro".into(),
            engine: "postgres".into(),
            engine_version: "16".into(),
            status: "available".into(),
            endpoint: None,
            allocated_storage: Some(20),
            multi_az: true,
            backup_retention_period: None,
        };
        let value = serde_json::to_value(&db).unwrap();
        assert_eq!(value["multiAZ"], true);
        assert_eq!(value["dbInstanceIdentifier"], "db");
    }
}
