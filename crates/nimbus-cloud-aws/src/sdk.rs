//! AWS SDK backed connector

use crate::client::{AwsApi, AwsConnector};
use crate::error::{AwsError, Result};
use crate::federation;
use crate::model::*;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{DateTime, DateTimeFormat};
use aws_sdk_sts::error::DisplayErrorContext;
use nimbus_cloud::CloudCredentials;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn api_error<E: std::error::Error>(operation: &'static str, err: E) -> AwsError {
    AwsError::api(operation, DisplayErrorContext(err).to_string())
}

fn timestamp(value: &DateTime) -> String {
    value
        .fmt(DateTimeFormat::DateTime)
        .unwrap_or_else(|_| value.secs().to_string())
}

fn ec2_tags(tags: &[aws_sdk_ec2::types::Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
        .collect()
}

/// Static-key connector
pub struct SdkConnector {
    credentials: Credentials,
    http: reqwest::Client,
}

impl SdkConnector {
    pub fn new(credentials: &CloudCredentials) -> Self {
        Self {
            credentials: Credentials::new(
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
                None,
                None,
                "nimbus",
            ),
            http: reqwest::Client::new(),
        }
    }

    async fn load(&self, region: &str) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(self.credentials.clone())
            .load()
            .await
    }
}

#[async_trait]
impl AwsConnector for SdkConnector {
    async fn connect(&self, region: &str) -> Result<Arc<dyn AwsApi>> {
        if region.is_empty() {
            return Err(AwsError::Config("region is empty".into()));
        }
        let config = self.load(region).await;
        Ok(Arc::new(SdkClient {
            region: region.to_string(),
            ec2: aws_sdk_ec2::Client::new(&config),
            s3: aws_sdk_s3::Client::new(&config),
            iam: aws_sdk_iam::Client::new(&config),
            sts: aws_sdk_sts::Client::new(&config),
            ssm: aws_sdk_ssm::Client::new(&config),
            kms: aws_sdk_kms::Client::new(&config),
            rds: aws_sdk_rds::Client::new(&config),
            eks: aws_sdk_eks::Client::new(&config),
            elb: aws_sdk_elasticloadbalancingv2::Client::new(&config),
        }))
    }

    async fn signin_token(&self, credentials: &FederationCredentials) -> Result<String> {
        federation::fetch_signin_token(&self.http, credentials).await
    }
}

struct SdkClient {
    region: String,
    ec2: aws_sdk_ec2::Client,
    s3: aws_sdk_s3::Client,
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    ssm: aws_sdk_ssm::Client,
    kms: aws_sdk_kms::Client,
    rds: aws_sdk_rds::Client,
    eks: aws_sdk_eks::Client,
    elb: aws_sdk_elasticloadbalancingv2::Client,
}

fn to_instance(i: &aws_sdk_ec2::types::Instance) -> Ec2Instance {
    Ec2Instance {
        instance_id: i.instance_id().unwrap_or_default().to_string(),
        instance_type: i
            .instance_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        state: i
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str().to_string())
            .unwrap_or_default(),
        public_ip: i.public_ip_address().unwrap_or_default().to_string(),
        private_ip: i.private_ip_address().unwrap_or_default().to_string(),
        tags: ec2_tags(i.tags()),
        iam_instance_profile: i
            .iam_instance_profile()
            .and_then(|p| p.arn())
            .map(str::to_string),
    }
}

#[async_trait]
impl AwsApi for SdkClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self) -> Result<Vec<Ec2Instance>> {
        let out = self
            .ec2
            .describe_instances()
            .send()
            .await
            .map_err(|e| api_error("describe EC2 instances", e))?;
        Ok(out
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .map(to_instance)
            .collect())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Ec2Instance>> {
        let out = self
            .ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error("describe instance", e))?;
        Ok(out
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .map(to_instance))
    }

    async fn associate_instance_profile(&self, instance_id: &str, profile_name: &str) -> Result<()> {
        let spec = aws_sdk_ec2::types::IamInstanceProfileSpecification::builder()
            .name(profile_name)
            .build();
        self.ec2
            .associate_iam_instance_profile()
            .instance_id(instance_id)
            .iam_instance_profile(spec)
            .send()
            .await
            .map_err(|e| api_error("associate instance profile", e))?;
        Ok(())
    }

    async fn describe_vpcs(&self) -> Result<Vec<Vpc>> {
        let out = self
            .ec2
            .describe_vpcs()
            .send()
            .await
            .map_err(|e| api_error("describe VPCs", e))?;
        Ok(out
            .vpcs()
            .iter()
            .map(|v| Vpc {
                vpc_id: v.vpc_id().unwrap_or_default().to_string(),
                cidr_block: v.cidr_block().unwrap_or_default().to_string(),
                state: v.state().map(|s| s.as_str().to_string()).unwrap_or_default(),
                is_default: v.is_default().unwrap_or(false),
                tags: ec2_tags(v.tags()),
                owner_id: v.owner_id().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn describe_route_tables(&self) -> Result<Vec<RouteTable>> {
        let out = self
            .ec2
            .describe_route_tables()
            .send()
            .await
            .map_err(|e| api_error("describe route tables", e))?;
        Ok(out
            .route_tables()
            .iter()
            .map(|rt| RouteTable {
                route_table_id: rt.route_table_id().unwrap_or_default().to_string(),
                vpc_id: rt.vpc_id().unwrap_or_default().to_string(),
                routes: rt
                    .routes()
                    .iter()
                    .map(|r| Route {
                        destination_cidr_block: r.destination_cidr_block().map(str::to_string),
                        gateway_id: r.gateway_id().map(str::to_string),
                        state: r.state().map(|s| s.as_str().to_string()).unwrap_or_default(),
                    })
                    .collect(),
                tags: ec2_tags(rt.tags()),
            })
            .collect())
    }

    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>> {
        let out = self
            .elb
            .describe_load_balancers()
            .send()
            .await
            .map_err(|e| api_error("describe load balancers", e))?;
        Ok(out
            .load_balancers()
            .iter()
            .map(|lb| LoadBalancer {
                load_balancer_name: lb.load_balancer_name().unwrap_or_default().to_string(),
                load_balancer_arn: lb.load_balancer_arn().unwrap_or_default().to_string(),
                kind: lb.r#type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                dns_name: lb.dns_name().map(str::to_string),
                state: lb
                    .state()
                    .and_then(|s| s.code())
                    .map(|c| c.as_str().to_string()),
                availability_zones: lb
                    .availability_zones()
                    .iter()
                    .filter_map(|az| az.zone_name().map(str::to_string))
                    .collect(),
                security_groups: lb.security_groups().to_vec(),
            })
            .collect())
    }

    async fn list_eks_clusters(&self) -> Result<Vec<EksCluster>> {
        let names = self
            .eks
            .list_clusters()
            .send()
            .await
            .map_err(|e| api_error("list EKS clusters", e))?;

        let mut clusters = Vec::new();
        for name in names.clusters() {
            let out = self
                .eks
                .describe_cluster()
                .name(name)
                .send()
                .await
                .map_err(|e| api_error("describe EKS cluster", e))?;
            if let Some(c) = out.cluster() {
                clusters.push(EksCluster {
                    name: c.name().unwrap_or(name.as_str()).to_string(),
                    arn: c.arn().unwrap_or_default().to_string(),
                    version: c.version().unwrap_or_default().to_string(),
                    status: c.status().map(|s| s.as_str().to_string()).unwrap_or_default(),
                    endpoint: c.endpoint().map(str::to_string),
                    role_arn: c.role_arn().map(str::to_string),
                    created_at: c.created_at().map(timestamp),
                });
            }
        }
        Ok(clusters)
    }

    async fn list_kms_keys(&self) -> Result<Vec<KmsKey>> {
        let out = self
            .kms
            .list_keys()
            .send()
            .await
            .map_err(|e| api_error("list KMS keys", e))?;

        let mut keys = Vec::new();
        for entry in out.keys() {
            let Some(key_id) = entry.key_id() else {
                continue;
            };
            let described = self
                .kms
                .describe_key()
                .key_id(key_id)
                .send()
                .await
                .map_err(|e| api_error("describe KMS key", e))?;
            let meta = described.key_metadata();
            keys.push(KmsKey {
                key_id: key_id.to_string(),
                arn: entry.key_arn().unwrap_or_default().to_string(),
                creation_date: meta.and_then(|m| m.creation_date()).map(timestamp),
                description: meta
                    .and_then(|m| m.description())
                    .unwrap_or_default()
                    .to_string(),
                key_state: meta
                    .and_then(|m| m.key_state())
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                key_usage: meta
                    .and_then(|m| m.key_usage())
                    .map(|u| u.as_str().to_string())
                    .unwrap_or_default(),
            });
        }
        Ok(keys)
    }

    async fn describe_db_instances(&self) -> Result<Vec<DbInstance>> {
        let out = self
            .rds
            .describe_db_instances()
            .send()
            .await
            .map_err(|e| api_error("describe RDS instances", e))?;
        Ok(out
            .db_instances()
            .iter()
            .map(|db| DbInstance {
                db_instance_identifier: db.db_instance_identifier().unwrap_or_default().to_string(),
                db_instance_arn: db.db_instance_arn().unwrap_or_default().to_string(),
                db_instance_class: db.db_instance_class().unwrap_or_default().to_string(),
                engine: db.engine().unwrap_or_default().to_string(),
                engine_version: db.engine_version().unwrap_or_default().to_string(),
                status: db.db_instance_status().unwrap_or_default().to_string(),
                endpoint: db
                    .endpoint()
                    .and_then(|e| e.address())
                    .map(str::to_string),
                allocated_storage: db.allocated_storage(),
                multi_az: db.multi_az().unwrap_or(false),
                backup_retention_period: db.backup_retention_period(),
            })
            .collect())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let out = self
            .s3
            .list_buckets()
            .send()
            .await
            .map_err(|e| api_error("list S3 buckets", e))?;
        Ok(out
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketSummary {
                    name: b.name()?.to_string(),
                    creation_date: b.creation_date().map(timestamp).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        let out = self
            .s3
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| api_error("get bucket location", e))?;
        Ok(out
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage> {
        let out = self
            .s3
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| api_error("list S3 objects", e))?;
        Ok(ObjectPage {
            objects: out
                .contents()
                .iter()
                .map(|o| S3Object {
                    key: o.key().unwrap_or_default().to_string(),
                    size: o.size().unwrap_or_default(),
                    last_modified: o.last_modified().map(timestamp).unwrap_or_default(),
                    e_tag: o.e_tag().unwrap_or_default().to_string(),
                })
                .collect(),
            truncated: out.is_truncated().unwrap_or(false),
            next_token: out.next_continuation_token().map(str::to_string),
        })
    }

    async fn presign_get_object(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let config = PresigningConfig::expires_in(ttl).map_err(|e| api_error("presign", e))?;
        let request = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| api_error("generate presigned URL", e))?;
        Ok(request.uri().to_string())
    }

    async fn list_users(&self) -> Result<Vec<IamUser>> {
        let out = self
            .iam
            .list_users()
            .send()
            .await
            .map_err(|e| api_error("list IAM users", e))?;
        Ok(out
            .users()
            .iter()
            .map(|u| IamUser {
                user_name: u.user_name().to_string(),
                user_id: u.user_id().to_string(),
                arn: u.arn().to_string(),
            })
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<IamRole>> {
        let out = self
            .iam
            .list_roles()
            .send()
            .await
            .map_err(|e| api_error("list IAM roles", e))?;
        Ok(out
            .roles()
            .iter()
            .map(|r| IamRole {
                role_name: r.role_name().to_string(),
                role_id: r.role_id().to_string(),
                arn: r.arn().to_string(),
            })
            .collect())
    }

    async fn get_current_user(&self) -> Result<String> {
        let out = self
            .iam
            .get_user()
            .send()
            .await
            .map_err(|e| api_error("get user", e))?;
        Ok(out
            .user()
            .map(|u| u.user_name().to_string())
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    async fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<String>> {
        let out = self
            .iam
            .list_attached_user_policies()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| api_error("list attached user policies", e))?;
        Ok(out
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_name().map(str::to_string))
            .collect())
    }

    async fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<()> {
        self.iam
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust_policy)
            .send()
            .await
            .map_err(|e| api_error("create role", e))?;
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| api_error("attach policy", e))?;
        Ok(())
    }

    async fn list_instance_profiles(&self) -> Result<Vec<String>> {
        let out = self
            .iam
            .list_instance_profiles()
            .send()
            .await
            .map_err(|e| api_error("list instance profiles", e))?;
        Ok(out
            .instance_profiles()
            .iter()
            .map(|p| p.instance_profile_name().to_string())
            .collect())
    }

    async fn create_instance_profile(&self, profile_name: &str) -> Result<()> {
        self.iam
            .create_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .map_err(|e| api_error("create instance profile", e))?;
        Ok(())
    }

    async fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()> {
        self.iam
            .add_role_to_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| api_error("add role to instance profile", e))?;
        Ok(())
    }

    async fn get_instance_profile(&self, profile_name: &str) -> Result<()> {
        self.iam
            .get_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .map_err(|e| api_error("get instance profile", e))?;
        Ok(())
    }

    async fn send_shell_command(&self, instance_id: &str, command: &str) -> Result<String> {
        let out = self
            .ssm
            .send_command()
            .instance_ids(instance_id)
            .document_name(crate::ssm::RUN_SHELL_DOCUMENT)
            .parameters("commands", vec![command.to_string()])
            .send()
            .await
            .map_err(|e| api_error("send command", e))?;
        out.command()
            .and_then(|c| c.command_id())
            .map(str::to_string)
            .ok_or_else(|| AwsError::api("send command", "response carried no command id"))
    }

    async fn get_command_invocation(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> Result<CommandInvocation> {
        let out = self
            .ssm
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(instance_id)
            .send()
            .await
            .map_err(|e| api_error("get command invocation", e))?;
        Ok(CommandInvocation {
            status: out
                .status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            stdout: out.standard_output_content().unwrap_or_default().to_string(),
            stderr: out.standard_error_content().unwrap_or_default().to_string(),
            start_time: out
                .execution_start_date_time()
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            end_time: out
                .execution_end_date_time()
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }

    async fn get_caller_identity(&self) -> Result<CallerIdentity> {
        let out = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| api_error("get caller identity", e))?;
        Ok(CallerIdentity {
            account: out.account().unwrap_or_default().to_string(),
            arn: out.arn().unwrap_or_default().to_string(),
            user_id: out.user_id().unwrap_or_default().to_string(),
        })
    }

    async fn get_federation_token(
        &self,
        name: &str,
        policy: &str,
        duration: Duration,
    ) -> Result<FederationCredentials> {
        let out = self
            .sts
            .get_federation_token()
            .name(name)
            .policy(policy)
            .duration_seconds(duration.as_secs() as i32)
            .send()
            .await
            .map_err(|e| api_error("get federation token", e))?;
        let creds = out
            .credentials()
            .ok_or_else(|| AwsError::api("get federation token", "response carried no credentials"))?;
        Ok(FederationCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration: timestamp(creds.expiration()),
        })
    }
}
