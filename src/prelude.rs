//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Loginward,
//! allowing users to import them with a single `use loginward::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::config::{ClientType, LockoutConfig, NotifyChannel};
pub use crate::error::{AttemptVerdict, LockoutError};
pub use crate::guard::{AttemptContext, LoginAction, LoginGuard};
pub use crate::lockout::{FailureOutcome, LockoutKind};

// Host collaborators
pub use crate::address::ClientRequest;
pub use crate::clock::{Clock, SystemClock};
pub use crate::notifier::{Email, Mailer};
pub use crate::storage::{KeyValueStore, MemoryStore};

// Admin surface
pub use crate::admin::{LockoutAdmin, LockoutStats};

// Feature-gated exports
#[cfg(feature = "postgres")]
pub use crate::postgres_storage::PostgresStore;

#[cfg(feature = "redis")]
pub use crate::redis_storage::RedisStore;
