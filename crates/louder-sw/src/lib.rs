//! # Still Louder Cache Controller
//!
//! The offline layer's service worker: precaching, request routing, caching
//! strategies, version-scoped cache partitions and control messages.
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer (navigator.serviceWorker)
//!     │
//!     └── Registration
//!             ├── installing (ServiceWorker → CacheController)
//!             ├── waiting    (ServiceWorker → CacheController)
//!             └── active     (ServiceWorker → CacheController)
//!
//! CacheController
//!     ├── Router    Request → Route
//!     └── Executor  Route → Response
//!             ├── CacheStorage  {version}-precache | -runtime | -images | -offline
//!             └── Fetcher       network edge
//! ```

use louder_core::LouderError;
use louder_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod container;
pub mod controller;
pub mod fallback;
pub mod message;
pub mod partition;
pub mod registration;
pub mod router;
pub mod strategy;
pub mod tasks;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use container::{RegistrationOptions, ServiceWorkerContainer, UpdateResult};
pub use controller::{
    ActivateReport, CacheController, EventOutcome, FetchOutcome, InstallReport, MessageOutcome,
    NotificationRequest, WorkerEvent,
};
pub use message::{reply_channel, ControlMessage, ReplyPort, VersionReply};
pub use partition::{PartitionKind, PartitionSet};
pub use registration::{
    Registration, ServiceWorker, ServiceWorkerEvent, ServiceWorkerId, ServiceWorkerState,
    UpdateViaCache, WorkerSlot,
};
pub use router::{OfflineFallback, RequestMatcher, Route, RouteRule, Router};
pub use strategy::Executor;
pub use tasks::BackgroundTasks;

/// Errors that can occur in cache controller operations.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: NetError,
    },

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid message: {0}")]
    MessageError(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error(transparent)]
    Config(#[from] LouderError),
}
