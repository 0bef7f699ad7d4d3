//! Nimbus Control Plane
//!
//! Task execution core: a durable task store, an at-least-once queue, the
//! worker that drives cloud adapters, and the services the HTTP daemon
//! calls into.
//!
//! ```text
//!            nimbusd (HTTP)
//!                 │
//!        ┌────────▼────────┐          ┌──────────────┐
//!        │  ControlPlane   │──push──► │  TaskQueue   │
//!        │   (services)    │          └──────┬───────┘
//!        └───┬─────────┬───┘                 │ pop
//!            │ inline  │                ┌────▼─────┐
//!            │         ▼                │  Worker  │
//!            │   ┌───────────┐          └────┬─────┘
//!            │   │ Database  │◄──────────────┤
//!            │   └───────────┘               │
//!            ▼                               ▼
//!      ProviderFactory ──► dyn CloudProvider (AWS / 阿里云 / GCP / Azure)
//! ```

pub mod auth;
pub mod db;
pub mod error;
pub mod model;
pub mod operation;
pub mod provider;
pub mod queue;
pub mod secrets;
pub mod service;
pub mod worker;

pub use auth::{Claims, TokenIssuer};
pub use db::Database;
pub use error::{ControlPlaneError, Result};
pub use model::{Credential, Task, TaskOutcome, TaskResult, TaskStatus, TaskType, User};
pub use operation::Operation;
pub use provider::{DefaultProviderFactory, ProviderFactory};
pub use queue::{Delivery, MemoryQueue, SqliteQueue, TaskQueue};
pub use secrets::SecretCipher;
pub use service::ControlPlane;
pub use worker::{Processed, Worker};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockProviderFactory;
