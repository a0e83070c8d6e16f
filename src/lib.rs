//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Loginward - Login Lockout and Registration Throttling
//!
//! Throttles authentication attempts per client address, escalating lockout
//! duration on repeated failures, and separately throttles new-account
//! registration per address.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use loginward::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`LoginGuard`] - Host-facing facade carrying per-request [`AttemptContext`]
//! - [`LockoutEngine`] - Failure counting and lockout escalation
//! - [`Gatekeeper`] - Read-only checks and user-facing messages
//! - [`RegistrationThrottle`] - Per-address registration limits
//! - [`LockoutAdmin`] - Totals, lockout log and reset actions
//! - [`LockoutError`] - Error types
//!
//! ## Storage
//!
//! Ledgers are persisted through the [`KeyValueStore`] trait. [`MemoryStore`]
//! is always available; Redis and PostgreSQL stores are feature-gated.
//!
//! ## Extensions (feature-gated)
//!
//! - Redis store (requires `redis` feature)
//! - PostgreSQL store (requires `postgres` feature)
//! - Tracing subscriber setup (requires `telemetry` feature)
//! - Prometheus metrics (requires `monitoring` feature)
//!
//! # Examples
//!
//! ```rust
//! use loginward::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let guard = LoginGuard::builder(Arc::new(MemoryStore::new()))
//!         .config(LockoutConfig::default())
//!         .build();
//!
//!     let request = ClientRequest::new().with_remote_addr("192.0.2.1");
//!     let mut ctx = guard.begin(&request, LoginAction::Login);
//!
//!     // 认证前检查
//!     assert!(guard.on_authentication_attempt(&mut ctx).await.is_allowed());
//!
//!     // 认证失败后计数
//!     let outcome = guard.on_authentication_failure(&mut ctx, "admin").await.unwrap();
//!     assert!(!outcome.is_lockout());
//! }
//! ```

pub mod prelude;

pub mod address;
pub mod admin;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod gatekeeper;
pub mod guard;
pub mod ledger;
pub mod lockout;
#[cfg(feature = "monitoring")]
pub mod metrics;
pub mod notifier;
#[cfg(feature = "postgres")]
pub mod postgres_storage;
#[cfg(feature = "redis")]
pub mod redis_storage;
pub mod registration;
pub mod storage;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// 重新导出常用类型
pub use address::{AddressResolver, ClientRequest};
pub use admin::{LockoutAdmin, LockoutStats, LogEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientType, LockoutConfig, NotifyChannel};
pub use error::{AttemptVerdict, LockoutError, MailerError, StorageError};
pub use gatekeeper::Gatekeeper;
pub use guard::{AttemptContext, FormError, LoginAction, LoginGuard, LoginGuardBuilder};
pub use ledger::{LedgerName, LedgerStore};
pub use lockout::{FailureOutcome, LockoutEngine, LockoutEvent, LockoutKind};
#[cfg(feature = "monitoring")]
pub use metrics::LockoutMetrics;
pub use notifier::{Email, Mailer, Notifier};
#[cfg(feature = "postgres")]
pub use postgres_storage::{PostgresStore, PostgresStoreConfig};
#[cfg(feature = "redis")]
pub use redis_storage::{RedisConfig, RedisStore};
pub use registration::RegistrationThrottle;
pub use storage::{KeyValueStore, MemoryStore};
#[cfg(feature = "telemetry")]
pub use telemetry::{init_tracing, TelemetryConfig};
