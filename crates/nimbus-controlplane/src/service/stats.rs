//! Dashboard summaries derived from the caller's stored results

use std::collections::{BTreeMap, HashSet};

use nimbus_cloud::ProviderTag;
use serde::Serialize;
use serde_json::Value;

use crate::db::stats_repo::{self, StoredFinding};
use crate::db::Database;
use crate::error::Result;
use crate::model::TaskType;

/// How many stored results the summaries look back over
pub const STATS_WINDOW: u32 = 500;
pub const RECENT_FINDINGS: usize = 10;

/// Record fields that mean "reachable from outside"
const EXPOSURE_FIELDS: [&str; 3] = ["publicIp", "dnsName", "endpoint"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub running: u64,
    /// Percentage of all tasks that completed, one decimal
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VulnerabilityStat {
    pub name: String,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceStat {
    pub resource: String,
    pub count: u64,
    pub vulnerable: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFinding {
    pub id: String,
    pub title: String,
    pub severity: String,
    pub cloud_provider: String,
    pub timestamp: String,
    pub status: String,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / whole as f64).round() / 10.0
}

fn is_exposed(record: &Value) -> bool {
    EXPOSURE_FIELDS.iter().any(|field| {
        record
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty())
    })
}

fn escalation_title(payload: &Value) -> String {
    let user = payload.get("user").and_then(Value::as_str);
    let user_type = payload.get("userType").and_then(Value::as_str);
    match (user, user_type) {
        (Some(user), Some(kind)) => format!("Privilege escalation path for {} ({})", user, kind),
        (Some(user), None) => format!("Privilege escalation path for {}", user),
        _ => "Privilege escalation attempted".to_string(),
    }
}

#[derive(Clone)]
pub struct StatsService {
    db: Database,
}

impl StatsService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn findings(&self, user_id: &str, task_type: TaskType) -> Result<Vec<StoredFinding>> {
        Ok(stats_repo::successful_results(
            &self.db,
            user_id,
            task_type.as_str(),
            STATS_WINDOW,
        )?)
    }

    pub fn task_stats(&self, user_id: &str) -> Result<TaskStats> {
        let counts = stats_repo::task_counts(&self.db, user_id)?;
        Ok(TaskStats {
            total: counts.total,
            success: counts.completed,
            failed: counts.failed,
            running: counts.running,
            success_rate: percent(counts.completed, counts.total),
        })
    }

    /// Risk levels reported by escalation probes, per provider
    ///
    /// A completed takeover counts as critical.
    pub fn vulnerability_stats(&self, user_id: &str) -> Result<Vec<VulnerabilityStat>> {
        let mut by_provider: BTreeMap<&'static str, VulnerabilityStat> = BTreeMap::new();
        let mut order = Vec::new();
        for tag in ProviderTag::ALL {
            order.push(tag.as_str());
            by_provider.insert(
                tag.as_str(),
                VulnerabilityStat {
                    name: tag.as_str().to_string(),
                    ..Default::default()
                },
            );
        }

        let slot = |provider: &str| ProviderTag::ALL.into_iter().find(|t| t.as_str() == provider);

        for finding in self.findings(user_id, TaskType::Escalate)? {
            let (Some(tag), Some(payload)) = (slot(&finding.provider), finding.payload()) else {
                continue;
            };
            let Some(stat) = by_provider.get_mut(tag.as_str()) else {
                continue;
            };
            match payload.get("riskLevel").and_then(Value::as_str) {
                Some("Critical") => stat.critical += 1,
                Some("High") => stat.high += 1,
                Some("Medium") => stat.medium += 1,
                Some("Low") => stat.low += 1,
                _ => {}
            }
        }
        for finding in self.findings(user_id, TaskType::Takeover)? {
            if let Some(stat) = slot(&finding.provider).and_then(|t| by_provider.get_mut(t.as_str()))
            {
                stat.critical += 1;
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|name| by_provider.remove(name))
            .collect())
    }

    /// Resource counts from the newest inventory of each credential
    pub fn resource_stats(&self, user_id: &str) -> Result<Vec<ResourceStat>> {
        let mut seen = HashSet::new();
        let mut totals: BTreeMap<String, (u64, u64)> = BTreeMap::new();

        // newest first, so the first hit per credential is its latest inventory
        for finding in self.findings(user_id, TaskType::Enumerate)? {
            if !seen.insert(finding.credential_id.clone()) {
                continue;
            }
            let Some(Value::Object(inventory)) = finding.payload() else {
                continue;
            };
            for (key, records) in inventory {
                let Value::Array(records) = records else {
                    continue;
                };
                if key == "errors" {
                    continue;
                }
                let entry = totals.entry(key).or_default();
                entry.0 += records.len() as u64;
                entry.1 += records.iter().filter(|r| is_exposed(r)).count() as u64;
            }
        }

        Ok(totals
            .into_iter()
            .map(|(resource, (count, vulnerable))| ResourceStat {
                resource,
                count,
                vulnerable,
                percentage: percent(vulnerable, count),
            })
            .collect())
    }

    /// Newest escalation and takeover outcomes
    pub fn recent_findings(&self, user_id: &str) -> Result<Vec<RecentFinding>> {
        let mut findings = Vec::new();

        for finding in self.findings(user_id, TaskType::Escalate)? {
            let Some(payload) = finding.payload() else {
                continue;
            };
            findings.push(RecentFinding {
                id: finding.task_id.clone(),
                title: escalation_title(&payload),
                severity: payload
                    .get("riskLevel")
                    .and_then(Value::as_str)
                    .unwrap_or("Medium")
                    .to_string(),
                cloud_provider: finding.provider.clone(),
                timestamp: finding.timestamp.clone(),
                status: "open".to_string(),
            });
        }
        for finding in self.findings(user_id, TaskType::Takeover)? {
            findings.push(RecentFinding {
                id: finding.task_id.clone(),
                title: format!("Platform takeover via {}", finding.credential_name),
                severity: "Critical".to_string(),
                cloud_provider: finding.provider.clone(),
                timestamp: finding.timestamp.clone(),
                status: "open".to_string(),
            });
        }

        findings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        findings.truncate(RECENT_FINDINGS);
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::task_repo;
    use crate::model::{TaskOutcome, TaskStatus};
    use serde_json::json;

    fn record(db: &Database, task_type: &str, outcome: TaskOutcome, at: &str) -> String {
        let task = task_repo::create(db, &task_repo::tests::new_task(task_type, "{}"), at).unwrap();
        task_repo::update_status(db, &task.id, TaskStatus::Running, at).unwrap();
        task_repo::finish(db, &task.id, &outcome, at).unwrap();
        task.id
    }

    #[test]
    fn test_task_stats_success_rate() {
        let db = task_repo::tests::seeded();
        record(&db, "escalate", TaskOutcome::Completed(json!({})), "t1");
        record(&db, "escalate", TaskOutcome::Completed(json!({})), "t2");
        record(&db, "escalate", TaskOutcome::Failed("boom".into()), "t3");

        let stats = StatsService::new(db).task_stats("user-alice").unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, 66.7);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("successRate").is_some());
    }

    #[test]
    fn test_empty_store_gives_zeroes() {
        let stats = StatsService::new(task_repo::tests::seeded());
        assert_eq!(stats.task_stats("user-alice").unwrap().success_rate, 0.0);
        assert!(stats.resource_stats("user-alice").unwrap().is_empty());
        assert!(stats.recent_findings("user-alice").unwrap().is_empty());
        let vulns = stats.vulnerability_stats("user-alice").unwrap();
        assert_eq!(vulns.len(), ProviderTag::ALL.len());
        assert_eq!(vulns[0], VulnerabilityStat {
            name: "AWS".into(),
            ..Default::default()
        });
    }

    #[test]
    fn test_vulnerability_and_findings_from_escalations() {
        let db = task_repo::tests::seeded();
        record(
            &db,
            "escalate",
            TaskOutcome::Completed(json!({"user": "root", "userType": "Root User", "riskLevel": "High", "message": "m"})),
            "2026-01-01T00:00:01.000Z",
        );
        let takeover = record(
            &db,
            "takeover",
            TaskOutcome::Completed(json!({"message": "Cloud platform takeover attempted"})),
            "2026-01-01T00:00:02.000Z",
        );
        record(&db, "escalate", TaskOutcome::Failed("denied".into()), "2026-01-01T00:00:03.000Z");

        let stats = StatsService::new(db);
        let aws = &stats.vulnerability_stats("user-alice").unwrap()[0];
        assert_eq!((aws.critical, aws.high, aws.medium), (1, 1, 0));

        let findings = stats.recent_findings("user-alice").unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].id, takeover);
        assert_eq!(findings[0].severity, "Critical");
        assert_eq!(findings[1].title, "Privilege escalation path for root (Root User)");
        assert_eq!(findings[1].cloud_provider, "AWS");

        // other users see nothing
        assert!(stats.recent_findings("user-bob").unwrap().is_empty());
    }

    #[test]
    fn test_resource_stats_use_latest_inventory() {
        let db = task_repo::tests::seeded();
        record(
            &db,
            "enumerate",
            TaskOutcome::Completed(json!({"instances": [{"instanceId": "old"}]})),
            "2026-01-01T00:00:01.000Z",
        );
        record(
            &db,
            "enumerate",
            TaskOutcome::Completed(json!({
                "instances": [
                    {"instanceId": "i-1", "publicIp": "3.3.3.3"},
                    {"instanceId": "i-2", "publicIp": ""},
                ],
                "buckets": [{"bucketName": "b"}],
                "errors": ["EC2 (us-west-2): denied"],
            })),
            "2026-01-01T00:00:02.000Z",
        );

        let stats = StatsService::new(db).resource_stats("user-alice").unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].resource, "buckets");
        assert_eq!(stats[0].vulnerable, 0);
        assert_eq!(stats[1].resource, "instances");
        assert_eq!(stats[1].count, 2);
        assert_eq!(stats[1].vulnerable, 1);
        assert_eq!(stats[1].percentage, 50.0);
    }
}
