//! AWS region set

/// Canonical public regions walked when a credential is not pinned
pub const AWS_REGIONS: [&str; 13] = [
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ca-central-1",
    "sa-east-1",
];

/// Root region for global services and for buckets with an empty location
pub const DEFAULT_REGION: &str = "us-east-1";

/// Normalize a `GetBucketLocation` answer
pub fn bucket_region(location_constraint: &str) -> &str {
    if location_constraint.is_empty() {
        DEFAULT_REGION
    } else {
        location_constraint
    }
}
