//! Service x region fan-out for resource enumeration
//!
//! An enumeration is expanded into units of work: one unit per global
//! service, and one unit per (regional service, region) pair. Every unit
//! runs under its own deadline. Failures are collected as messages instead
//! of aborting the call, and the survivors are merged into an [`Inventory`].

use crate::error::{CloudError, Result};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Deadline applied to a unit unless its service overrides it
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(10);

/// Deadline for bulk listings that page across objects
pub const BULK_LISTING_DEADLINE: Duration = Duration::from_secs(60);

/// Whether a service is invoked once or once per region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Regional,
}

/// One enumerable service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCall {
    /// Key in the result map (`instances`, `buckets`, ...)
    pub key: &'static str,
    /// Label used in error messages (`EC2`, `IAM Users`, ...)
    pub label: &'static str,
    pub scope: Scope,
    pub deadline: Duration,
}

impl ServiceCall {
    pub const fn regional(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            scope: Scope::Regional,
            deadline: DEFAULT_CALL_DEADLINE,
        }
    }

    pub const fn global(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            scope: Scope::Global,
            deadline: DEFAULT_CALL_DEADLINE,
        }
    }

    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// A single unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub service: ServiceCall,
    /// `None` for global services
    pub region: Option<String>,
}

impl Unit {
    fn failure_message(&self, err: &str) -> String {
        match &self.region {
            Some(region) => format!("{} ({}): {}", self.service.label, region, err),
            None => format!("{}: {}", self.service.label, err),
        }
    }
}

/// Aggregated enumeration result
///
/// Serializes as a flat object: one array per service key, plus an `errors`
/// array when any unit failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(flatten)]
    pub services: BTreeMap<String, Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self, key: &str) -> &[serde_json::Value] {
        self.services.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }
}

/// Plans and executes units over a region set
#[derive(Debug, Clone)]
pub struct FanOut {
    regions: Vec<String>,
}

impl FanOut {
    /// A pinned region wins; otherwise every region in `all_regions` is used.
    pub fn new(pinned: Option<&str>, all_regions: &[&str]) -> Self {
        let regions = match pinned.filter(|r| !r.is_empty()) {
            Some(region) => vec![region.to_string()],
            None => all_regions.iter().map(|r| r.to_string()).collect(),
        };
        Self { regions }
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Expand services into units, preserving service order then region order
    pub fn plan(&self, services: &[ServiceCall]) -> Vec<Unit> {
        let mut units = Vec::new();
        for service in services {
            match service.scope {
                Scope::Global => units.push(Unit {
                    service: *service,
                    region: None,
                }),
                Scope::Regional => {
                    for region in &self.regions {
                        units.push(Unit {
                            service: *service,
                            region: Some(region.clone()),
                        });
                    }
                }
            }
        }
        units
    }

    /// Run every unit concurrently and merge the outcomes
    ///
    /// `call` receives the unit and returns the records it found or an error
    /// message. Records from regional units get the region stamped on them.
    /// Fails with [`CloudError::NoResults`] only when no unit succeeded.
    pub async fn run<F, Fut>(&self, services: &[ServiceCall], call: F) -> Result<Inventory>
    where
        F: Fn(Unit) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<serde_json::Value>, String>>,
    {
        let units = self.plan(services);
        let outcomes = join_all(units.iter().cloned().map(|unit| {
            let deadline = unit.service.deadline;
            let fut = call(unit);
            async move {
                match tokio::time::timeout(deadline, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(format!("deadline exceeded after {}s", deadline.as_secs())),
                }
            }
        }))
        .await;

        let mut inventory = Inventory::new();
        for service in services {
            inventory.services.entry(service.key.to_string()).or_default();
        }

        let mut succeeded = 0usize;
        for (unit, outcome) in units.iter().zip(outcomes) {
            match outcome {
                Ok(records) => {
                    succeeded += 1;
                    let bucket = inventory
                        .services
                        .entry(unit.service.key.to_string())
                        .or_default();
                    for mut record in records {
                        if let (Some(region), Some(obj)) = (&unit.region, record.as_object_mut()) {
                            obj.insert(
                                "region".to_string(),
                                serde_json::Value::String(region.clone()),
                            );
                        }
                        bucket.push(record);
                    }
                }
                Err(err) => {
                    let message = unit.failure_message(&err);
                    tracing::warn!(unit = %message, "enumeration unit failed");
                    inventory.errors.push(message);
                }
            }
        }

        tracing::debug!(
            units = units.len(),
            succeeded,
            records = inventory.total_records(),
            "fan-out finished"
        );

        if succeeded == 0 && !units.is_empty() {
            return Err(CloudError::NoResults(inventory.errors.join("; ")));
        }

        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REGIONS: [&str; 3] = ["us-east-1", "us-west-2", "eu-west-1"];
    const EC2: ServiceCall = ServiceCall::regional("instances", "EC2");
    const S3: ServiceCall = ServiceCall::global("buckets", "S3");

    #[test]
    fn test_pinned_region_wins() {
        let fanout = FanOut::new(Some("eu-west-1"), &REGIONS);
        assert_eq!(fanout.regions(), ["eu-west-1".to_string()]);

        let fanout = FanOut::new(Some(""), &REGIONS);
        assert_eq!(fanout.regions().len(), 3);
    }

    #[test]
    fn test_plan_invokes_global_services_once() {
        let fanout = FanOut::new(None, &REGIONS);
        let units = fanout.plan(&[EC2, S3]);
        assert_eq!(units.len(), 4);
        assert_eq!(units.iter().filter(|u| u.region.is_none()).count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded_not_fatal() {
        let fanout = FanOut::new(None, &REGIONS);
        let inventory = fanout
            .run(&[EC2], |unit| async move {
                match unit.region.as_deref() {
                    Some("us-west-2") => Err("AccessDenied".to_string()),
                    _ => Ok(vec![json!({"instanceId": "i-1"})]),
                }
            })
            .await
            .unwrap();

        let instances = inventory.records("instances");
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0]["region"], "us-east-1");
        assert_eq!(instances[1]["region"], "eu-west-1");
        assert_eq!(inventory.errors, vec!["EC2 (us-west-2): AccessDenied"]);
    }

    #[tokio::test]
    async fn test_global_failure_message_has_no_region() {
        let fanout = FanOut::new(None, &REGIONS);
        let inventory = fanout
            .run(&[EC2, S3], |unit| async move {
                if unit.service.key == "buckets" {
                    Err("boom".to_string())
                } else {
                    Ok(vec![])
                }
            })
            .await
            .unwrap();

        assert_eq!(inventory.errors, vec!["S3: boom"]);
        assert!(inventory.records("buckets").is_empty());
        let rendered = serde_json::to_value(&inventory).unwrap();
        assert_eq!(rendered["buckets"], json!([]));
    }

    #[tokio::test]
    async fn test_every_unit_failing_is_no_results() {
        let fanout = FanOut::new(None, &REGIONS);
        let err = fanout
            .run(&[EC2], |_unit| async { Err("down".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::NoResults(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_unit_hits_its_deadline() {
        let fanout = FanOut::new(Some("us-east-1"), &REGIONS);
        let slow = EC2.with_deadline(Duration::from_secs(1));
        let inventory = fanout
            .run(&[slow, S3], |unit| async move {
                if unit.service.key == "instances" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(vec![json!({"bucketName": "b"})])
            })
            .await
            .unwrap();

        assert_eq!(
            inventory.errors,
            vec!["EC2 (us-east-1): deadline exceeded after 1s"]
        );
        assert_eq!(inventory.records("buckets").len(), 1);
        assert!(inventory.records("buckets")[0].get("region").is_none());
    }

    #[tokio::test]
    async fn test_errors_key_omitted_when_clean() {
        let fanout = FanOut::new(Some("us-east-1"), &REGIONS);
        let inventory = fanout
            .run(&[EC2], |_unit| async { Ok(vec![json!({"instanceId": "i-9"})]) })
            .await
            .unwrap();
        let rendered = serde_json::to_value(&inventory).unwrap();
        assert!(rendered.get("errors").is_none());
        assert_eq!(rendered["instances"][0]["region"], "us-east-1");
    }
}
