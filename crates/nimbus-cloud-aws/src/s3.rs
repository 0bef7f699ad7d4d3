//! S3 bucket walk and object operations

use crate::client::{AwsApi, AwsConnector};
use crate::error::{AwsError, Result, within};
use crate::model::{BucketRecord, S3Object};
use crate::regions::{DEFAULT_REGION, bucket_region};
use nimbus_cloud::CloudError;
use serde_json::{Value, json};
use std::time::Duration;

/// Buckets processed per enumeration
pub const MAX_BUCKETS: usize = 50;

/// Deadline for `list_objects` operations
pub const LIST_OBJECTS_DEADLINE: Duration = Duration::from_secs(30);

/// Deadline for resolving a bucket's location before presigning
pub const LOCATION_DEADLINE: Duration = Duration::from_secs(10);

/// Lifetime of generated download URLs
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// How a page error is treated while listing objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageErrors {
    /// Stop paginating and keep what was collected
    Truncate,
    /// Fail the listing
    Propagate,
}

/// Resolve the region a bucket lives in; lookup errors fall back to `us-east-1`
pub async fn resolve_region(api: &dyn AwsApi, bucket: &str) -> String {
    match api.bucket_location(bucket).await {
        Ok(location) => bucket_region(&location).to_string(),
        Err(err) => {
            tracing::debug!(bucket, error = %err, "bucket location lookup failed");
            DEFAULT_REGION.to_string()
        }
    }
}

/// Page through a bucket until the listing is no longer truncated
pub async fn list_objects(
    api: &dyn AwsApi,
    bucket: &str,
    prefix: &str,
    on_error: PageErrors,
) -> Result<Vec<S3Object>> {
    let mut objects = Vec::new();
    let mut continuation = None;

    loop {
        let page = match api.list_objects_page(bucket, prefix, continuation.take()).await {
            Ok(page) => page,
            Err(err) => match on_error {
                PageErrors::Truncate => {
                    tracing::debug!(bucket, error = %err, "object pagination stopped");
                    break;
                }
                PageErrors::Propagate => return Err(err),
            },
        };

        objects.extend(page.objects);
        match page.next_token {
            Some(token) if page.truncated => continuation = Some(token),
            _ => break,
        }
    }

    Ok(objects)
}

/// Enumerate buckets with their objects
///
/// Buckets outside `region_filter` are skipped and do not count toward
/// [`MAX_BUCKETS`]. Once the cap is hit, a sentinel record reports how many
/// buckets were never looked at.
pub async fn walk_buckets(
    root: &dyn AwsApi,
    connector: &dyn AwsConnector,
    region_filter: Option<&str>,
) -> Result<Vec<BucketRecord>> {
    let buckets = root.list_buckets().await?;
    let total = buckets.len();
    let mut records = Vec::new();
    let mut examined = 0;

    for bucket in buckets {
        if records.len() >= MAX_BUCKETS {
            break;
        }
        examined += 1;

        let region = resolve_region(root, &bucket.name).await;
        if region_filter.is_some_and(|filter| filter != region) {
            continue;
        }

        let objects = match connector.connect(&region).await {
            Ok(regional) => {
                list_objects(regional.as_ref(), &bucket.name, "", PageErrors::Truncate).await?
            }
            Err(err) => {
                tracing::debug!(bucket = %bucket.name, error = %err, "regional S3 client unavailable");
                Vec::new()
            }
        };

        records.push(BucketRecord {
            bucket_name: bucket.name,
            creation_date: bucket.creation_date,
            region,
            objects,
            more_objects: false,
        });
    }

    let unprocessed = total - examined;
    if unprocessed > 0 {
        records.push(BucketRecord::overflow(unprocessed));
    }

    Ok(records)
}

/// `s3.list_objects`: strict listing in the bucket's own region
pub async fn list_objects_operation(
    root: &dyn AwsApi,
    connector: &dyn AwsConnector,
    bucket: &str,
    prefix: &str,
) -> Result<Value> {
    let objects = within(LIST_OBJECTS_DEADLINE, "list S3 objects", async {
        let region = resolve_region(root, bucket).await;
        let regional = connector.connect(&region).await?;
        list_objects(regional.as_ref(), bucket, prefix, PageErrors::Propagate).await
    })
    .await?;

    Ok(json!({
        "message": "S3 objects listed successfully",
        "bucket": bucket,
        "objects": objects,
    }))
}

/// `s3.download`: a presigned GET URL, never the bytes
pub async fn download_operation(
    root: &dyn AwsApi,
    connector: &dyn AwsConnector,
    bucket: &str,
    key: Option<&str>,
) -> Result<Value> {
    let key = key.ok_or_else(|| AwsError::Cloud(CloudError::BadParam("key is required".into())))?;

    let region = match tokio::time::timeout(LOCATION_DEADLINE, resolve_region(root, bucket)).await {
        Ok(region) => region,
        Err(_) => DEFAULT_REGION.to_string(),
    };
    let regional = connector.connect(&region).await?;
    let url = regional
        .presign_get_object(bucket, key, DOWNLOAD_URL_TTL)
        .await?;

    Ok(json!({
        "message": "Download URL generated",
        "bucket": bucket,
        "key": key,
        "region": region,
        "download_url": url,
    }))
}
