//! Shared fixture: in-memory store, memory queue, AWS over a mock connector

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nimbus_cloud_aws::mock::MockConnector;
use nimbus_cloud_aws::model::Ec2Instance;
use nimbus_controlplane::service::{NewCredential, Registration};
use nimbus_controlplane::{
    ControlPlane, Credential, Database, MemoryQueue, MockProviderFactory, SecretCipher,
    TokenIssuer, User, Worker,
};

pub struct Fixture {
    pub plane: ControlPlane,
    pub queue: Arc<MemoryQueue>,
    pub factory: Arc<MockProviderFactory>,
}

impl Fixture {
    pub fn new(connector: MockConnector) -> Self {
        Self::build(connector, true)
    }

    /// No queue configured at all
    pub fn without_queue(connector: MockConnector) -> Self {
        Self::build(connector, false)
    }

    fn build(connector: MockConnector, with_queue: bool) -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let factory = Arc::new(MockProviderFactory::new(connector));
        let plane = ControlPlane::new(
            Database::open_in_memory().unwrap(),
            SecretCipher::derived_from("fixture-secret").unwrap(),
            TokenIssuer::new("fixture-secret", 1),
            with_queue.then(|| queue.clone() as Arc<dyn nimbus_controlplane::TaskQueue>),
            factory.clone(),
        );
        Self {
            plane,
            queue,
            factory,
        }
    }

    pub fn user(&self, name: &str) -> User {
        self.plane
            .auth()
            .register(&Registration {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password: "password".to_string(),
            })
            .unwrap()
            .user
    }

    pub fn credential(&self, user: &User, provider: &str) -> Credential {
        self.plane
            .credentials()
            .create(
                &user.id,
                &NewCredential {
                    cloud_provider: provider.to_string(),
                    access_key: "AKIAFIXTURE".to_string(),
                    secret_key: "fixture-secret-key".to_string(),
                    region: String::new(),
                    name: format!("{} {}", user.username, provider),
                    description: String::new(),
                },
            )
            .unwrap()
    }

    pub fn worker(&self) -> Worker {
        self.plane.worker().with_pop_timeout(Duration::from_millis(50))
    }
}

pub fn instance(id: &str) -> Ec2Instance {
    Ec2Instance {
        instance_id: id.to_string(),
        instance_type: "t3.micro".to_string(),
        state: "running".to_string(),
        public_ip: "54.0.0.1".to_string(),
        private_ip: "10.0.0.1".to_string(),
        ..Default::default()
    }
}
