//! Provider factory
//!
//! Maps the tag stored on a credential to an adapter constructor. Adapters
//! are built per task or per request and never pooled.

use async_trait::async_trait;
use nimbus_cloud::{CloudCredentials, CloudError, CloudProvider, ProviderTag};
use nimbus_cloud_aliyun::AliyunProvider;
use nimbus_cloud_aws::AwsProvider;
use nimbus_cloud_azure::AzureProvider;
use nimbus_cloud_gcp::GcpProvider;

/// Builds adapters from a provider tag and raw key material
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn build(
        &self,
        provider: &str,
        credentials: CloudCredentials,
    ) -> nimbus_cloud::Result<Box<dyn CloudProvider>>;
}

/// Production factory
///
/// `腾讯云` is a known tag without an adapter, so it fails like any unknown
/// tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProviderFactory;

#[async_trait]
impl ProviderFactory for DefaultProviderFactory {
    async fn build(
        &self,
        provider: &str,
        credentials: CloudCredentials,
    ) -> nimbus_cloud::Result<Box<dyn CloudProvider>> {
        let tag: ProviderTag = provider.parse()?;
        let adapter: Box<dyn CloudProvider> = match tag {
            ProviderTag::Aws => Box::new(AwsProvider::connect(credentials).await?),
            ProviderTag::Aliyun => Box::new(AliyunProvider::new(credentials)?),
            ProviderTag::Gcp => Box::new(GcpProvider::new(credentials)?),
            ProviderTag::Azure => Box::new(AzureProvider::new(credentials)?),
            ProviderTag::Tencent => {
                return Err(CloudError::UnsupportedProvider(tag.to_string()));
            }
        };
        Ok(adapter)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockProviderFactory;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use nimbus_cloud_aws::CeremonyTimings;
    use nimbus_cloud_aws::mock::MockConnector;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory whose AWS adapters run against a [`MockConnector`]
    ///
    /// Other tags go through [`DefaultProviderFactory`].
    #[derive(Clone)]
    pub struct MockProviderFactory {
        connector: MockConnector,
        timings: CeremonyTimings,
        builds: Arc<AtomicUsize>,
    }

    impl MockProviderFactory {
        pub fn new(connector: MockConnector) -> Self {
            Self {
                connector,
                timings: CeremonyTimings::default(),
                builds: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with_timings(mut self, timings: CeremonyTimings) -> Self {
            self.timings = timings;
            self
        }

        pub fn connector(&self) -> &MockConnector {
            &self.connector
        }

        /// Number of adapters built so far
        pub fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderFactory for MockProviderFactory {
        async fn build(
            &self,
            provider: &str,
            credentials: CloudCredentials,
        ) -> nimbus_cloud::Result<Box<dyn CloudProvider>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            match provider.parse::<ProviderTag>()? {
                ProviderTag::Aws => {
                    credentials.ensure_present()?;
                    let adapter = AwsProvider::with_connector(
                        Arc::new(self.connector.clone()),
                        credentials.region.clone(),
                    )
                    .with_timings(self.timings.clone());
                    Ok(Box::new(adapter))
                }
                _ => DefaultProviderFactory.build(provider, credentials).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> CloudCredentials {
        CloudCredentials::new("AK", "SK", None)
    }

    #[tokio::test]
    async fn test_stub_providers_are_built() {
        let factory = DefaultProviderFactory;
        for (tag, expected) in [
            ("阿里云", ProviderTag::Aliyun),
            ("GCP", ProviderTag::Gcp),
            ("Azure", ProviderTag::Azure),
        ] {
            let adapter = factory.build(tag, creds()).await.unwrap();
            assert_eq!(adapter.tag(), expected);
        }
    }

    #[tokio::test]
    async fn test_unknown_and_unimplemented_tags_fail() {
        let factory = DefaultProviderFactory;
        for tag in ["Oracle", "腾讯云", "aws", ""] {
            let err = factory.build(tag, creds()).await.err().unwrap();
            assert!(
                matches!(err, CloudError::UnsupportedProvider(_)),
                "tag {:?} gave {:?}",
                tag,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_empty_keys_are_rejected() {
        let err = DefaultProviderFactory
            .build("GCP", CloudCredentials::new("", "SK", None))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CloudError::InvalidCredentials(_)));
    }

    #[cfg(not(feature = "aws-sdk"))]
    #[tokio::test]
    async fn test_aws_without_sdk_reports_bootstrap_failure() {
        let err = DefaultProviderFactory
            .build("AWS", creds())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CloudError::SdkBootstrap(_)));
    }

    #[tokio::test]
    async fn test_mock_factory_builds_aws_over_connector() {
        let factory = MockProviderFactory::new(nimbus_cloud_aws::mock::MockConnector::new());
        let adapter = factory
            .build("AWS", CloudCredentials::new("AK", "SK", Some("eu-west-1".into())))
            .await
            .unwrap();
        assert_eq!(adapter.tag(), ProviderTag::Aws);
        assert_eq!(adapter.region(), Some("eu-west-1"));
        assert_eq!(factory.builds(), 1);
    }
}
