//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 锁定引擎
//!
//! 登录失败的状态机：在有效期内累计失败次数，每满 `allowed_retries` 次
//! 锁定一次；累计达到 `allowed_retries * allowed_lockouts` 次时升级为长锁定
//! 并清空该地址的计数。
//!
//! # 示例
//!
//! ```rust
//! use loginward::clock::SystemClock;
//! use loginward::config::LockoutConfig;
//! use loginward::ledger::LedgerStore;
//! use loginward::lockout::{FailureOutcome, LockoutEngine};
//! use loginward::notifier::Notifier;
//! use loginward::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(LockoutConfig::default());
//!     let ledgers = LedgerStore::new(Arc::new(MemoryStore::new()), "demo:");
//!     let notifier = Arc::new(Notifier::new(config.clone(), ledgers.clone(), None));
//!     let engine = LockoutEngine::new(config, ledgers, notifier, Arc::new(SystemClock));
//!
//!     let outcome = engine.record_failure("203.0.113.9", "admin").await.unwrap();
//!     assert!(matches!(outcome, FailureOutcome::Counted { retries: 1, remaining: 3 }));
//! }
//! ```

use crate::cleanup;
use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::error::LockoutError;
use crate::ledger::{LedgerName, LedgerSet, LedgerStore};
#[cfg(feature = "monitoring")]
use crate::metrics::LockoutMetrics;
use crate::notifier::Notifier;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 锁定类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutKind {
    /// 普通锁定，保留失败计数
    Normal,
    /// 长锁定，清空失败计数
    Long,
}

/// 一次失败记录的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// 地址正处于锁定中，本次失败不计数
    AlreadyLockedOut,
    /// 已计数，尚未锁定
    Counted { retries: u32, remaining: u32 },
    /// 本次失败触发了锁定
    LockedOut {
        kind: LockoutKind,
        until: DateTime<Utc>,
        retries: u32,
    },
}

impl FailureOutcome {
    /// 本次失败是否触发了新的锁定
    pub fn is_lockout(&self) -> bool {
        matches!(self, FailureOutcome::LockedOut { .. })
    }
}

/// 新锁定事件，交给通知器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutEvent {
    pub address: String,
    /// 最后尝试的用户名，可能为空
    pub username: String,
    pub kind: LockoutKind,
    /// 触发锁定时的失败次数
    pub retries: u32,
    pub until: DateTime<Utc>,
}

/// 锁定引擎
pub struct LockoutEngine {
    config: Arc<LockoutConfig>,
    ledgers: LedgerStore,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<LockoutMetrics>>,
}

impl std::fmt::Debug for LockoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutEngine")
            .field("allowed_retries", &self.config.allowed_retries)
            .field("allowed_lockouts", &self.config.allowed_lockouts)
            .field("ledgers", &self.ledgers)
            .finish()
    }
}

impl LockoutEngine {
    pub fn new(
        config: Arc<LockoutConfig>,
        ledgers: LedgerStore,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: LockoutConfig::ensure_sanitized(config),
            ledgers,
            notifier,
            clock,
            #[cfg(feature = "monitoring")]
            metrics: None,
        }
    }

    /// 设置指标
    #[cfg(feature = "monitoring")]
    pub fn with_metrics(mut self, metrics: Arc<LockoutMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 记录一次认证失败
    pub async fn record_failure(
        &self,
        address: &str,
        username: &str,
    ) -> Result<FailureOutcome, LockoutError> {
        self.record_failure_at(address, username, self.clock.now())
            .await
    }

    /// 以给定时间记录一次认证失败
    #[instrument(skip(self, username), fields(address = %address))]
    pub async fn record_failure_at(
        &self,
        address: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, LockoutError> {
        let mut set = LedgerSet::load(&self.ledgers).await?;

        if let Some(until) = set.lockouts.get(address) {
            if now <= *until {
                debug!("Address {} already locked out until {}", address, until);
                return Ok(FailureOutcome::AlreadyLockedOut);
            }
        }

        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics.record_failure();
        }

        let retries = match (set.retries.get(address), set.retries_valid.get(address)) {
            (Some(count), Some(valid)) if now < *valid => count.saturating_add(1),
            _ => 1,
        };
        set.retries.insert(address.to_string(), retries);
        set.retries_valid
            .insert(address.to_string(), now + self.config.valid_period());
        set.mark_dirty(LedgerName::Retries);
        set.mark_dirty(LedgerName::RetriesValid);

        let allowed = self.config.allowed_retries;
        if retries % allowed != 0 {
            cleanup::sweep(&mut set, now);
            set.persist(&self.ledgers).await?;
            let remaining = allowed - retries % allowed;
            debug!(
                "Counted failure {} for {}, {} remaining",
                retries, address, remaining
            );
            return Ok(FailureOutcome::Counted { retries, remaining });
        }

        let (kind, until) = if retries >= self.config.retries_long() {
            set.retries.remove(address);
            set.retries_valid.remove(address);
            (LockoutKind::Long, now + self.config.long_period())
        } else {
            (LockoutKind::Normal, now + self.config.lockout_period())
        };
        set.lockouts.insert(address.to_string(), until);
        set.mark_dirty(LedgerName::Lockouts);

        cleanup::sweep(&mut set, now);
        set.persist(&self.ledgers).await?;

        info!(
            "Locked out {} until {} ({:?}, {} failures)",
            address, until, kind, retries
        );

        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics.record_lockout(kind);
        }

        let event = LockoutEvent {
            address: address.to_string(),
            username: username.to_string(),
            kind,
            retries,
            until,
        };
        self.notifier.notify(&event).await;

        self.ledgers
            .increment_total(LedgerName::LockoutsTotal)
            .await?;

        Ok(FailureOutcome::LockedOut {
            kind,
            until,
            retries,
        })
    }
}
