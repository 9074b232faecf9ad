//! Selectel provider core
//!
//! Shared building blocks for the per-service handler crates: the typed
//! resource handler contract, the status poller, the lock service and the
//! JSON API client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          terraform-provider-selectel            │
//! │        (Provider registry, CLI harness)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │  Box<dyn DynResource>
//! ┌─────────────────▼───────────────────────────────┐
//! │                selectel-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ResourceHandler { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │StateWaiter │ │LockService │ │ServiceClnt │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └───────┬──────────┬──────────┬──────────┬────────┘
//!         │          │          │          │
//!     ┌───▼───┐  ┌───▼───┐  ┌───▼───┐  ┌───▼─────┐
//!     │  vpc  │  │  mks  │  │ dbaas │  │ domains │
//!     └───────┘  └───────┘  └───────┘  └─────────┘
//! ```

pub mod context;
pub mod error;
pub mod http;
pub mod lock;
pub mod plan;
pub mod resource;
pub mod waiter;

// Re-exports
pub use context::{ProviderContext, Scope};
pub use error::{CloudError, Result};
pub use http::{HEADER_X_AUTH_TOKEN, HEADER_X_TOKEN, RetryConfig, ServiceClient};
pub use lock::{LockService, ResourceLock};
pub use plan::{Action, ActionType, DuplicateKey, KeyedDiff, Plan, PlanSummary, find_duplicate_key};
pub use resource::{DynResource, Identified, ResourceHandler, ResourceState, Timeouts, erase};
pub use waiter::{
    Observation, PollTiming, STATUS_GONE, STATUS_PRESENT, StateRefresh, StateWaiter,
    deletion_observation,
};
