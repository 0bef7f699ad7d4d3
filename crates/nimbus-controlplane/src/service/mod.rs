//! Services behind the HTTP surface
//!
//! ```text
//! ┌──────────────────────── ControlPlane ─────────────────────────┐
//! │  AuthService   CredentialService   TaskService   StatsService │
//! └───────┬───────────────┬─────────────────┬─────────────┬───────┘
//!         │               │                 │             │
//!     TokenIssuer    SecretCipher    TaskQueue + factory   │
//!         └───────────────┴────────┬────────┴─────────────┘
//!                                  ▼
//!                           Database (SQLite)
//! ```
//!
//! Every call takes the acting user id; ownership is enforced here, never
//! in the transport.

use std::sync::Arc;

use nimbus_config::Settings;

use crate::auth::TokenIssuer;
use crate::db::Database;
use crate::error::Result;
use crate::provider::{DefaultProviderFactory, ProviderFactory};
use crate::queue::{self, TaskQueue};
use crate::secrets::SecretCipher;
use crate::worker::Worker;

pub mod auth;
pub mod credential;
pub mod stats;
pub mod task;

pub use auth::{AuthResponse, AuthService, ProfileUpdate, Registration};
pub use credential::{CredentialService, CredentialUpdate, NewCredential};
pub use stats::{
    RecentFinding, ResourceStat, StatsService, TaskStats, VulnerabilityStat,
};
pub use task::{InlineOutcome, LastEnumeration, Submission, TaskService, TaskSubmission};

/// Shared handles every service is built from
#[derive(Clone)]
pub struct ControlPlane {
    pub db: Database,
    pub cipher: SecretCipher,
    pub tokens: TokenIssuer,
    pub queue: Option<Arc<dyn TaskQueue>>,
    pub factory: Arc<dyn ProviderFactory>,
}

impl ControlPlane {
    pub fn new(
        db: Database,
        cipher: SecretCipher,
        tokens: TokenIssuer,
        queue: Option<Arc<dyn TaskQueue>>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            db,
            cipher,
            tokens,
            queue,
            factory,
        }
    }

    /// Open the store, seed the admin user and wire the configured queue
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let db = Database::open(&settings.database_path)?;
        let plane = Self::new(
            db.clone(),
            SecretCipher::from_settings(settings)?,
            TokenIssuer::from_settings(&settings.jwt),
            queue::open(settings.task_queue, &db),
            Arc::new(DefaultProviderFactory),
        );
        plane.auth().ensure_admin(&settings.admin_password)?;
        Ok(plane)
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.db.clone(), self.tokens.clone())
    }

    pub fn credentials(&self) -> CredentialService {
        CredentialService::new(self.db.clone(), self.cipher.clone())
    }

    pub fn tasks(&self) -> TaskService {
        TaskService::new(
            self.db.clone(),
            self.credentials(),
            self.queue.clone(),
            self.factory.clone(),
        )
    }

    pub fn stats(&self) -> StatsService {
        StatsService::new(self.db.clone())
    }

    /// Worker consuming this plane's queue
    pub fn worker(&self) -> Worker {
        Worker::new(
            self.db.clone(),
            self.queue.clone(),
            self.factory.clone(),
            self.cipher.clone(),
        )
    }
}
