//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 注册限流
//!
//! 与失败计数平行的结构：在 `register_duration` 窗口内统计每个地址的注册
//! 次数，达到 `register_allowed` 后拒绝该地址继续注册，直到窗口过期。

use crate::cleanup;
use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::error::LockoutError;
use crate::ledger::{CountLedger, LedgerName, LedgerSet, LedgerStore, TimeLedger};
#[cfg(feature = "monitoring")]
use crate::metrics::LockoutMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 注册限流器
pub struct RegistrationThrottle {
    config: Arc<LockoutConfig>,
    ledgers: LedgerStore,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<LockoutMetrics>>,
}

impl std::fmt::Debug for RegistrationThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationThrottle")
            .field("register_enforce", &self.config.register_enforce)
            .field("register_allowed", &self.config.register_allowed)
            .finish()
    }
}

impl RegistrationThrottle {
    pub fn new(config: Arc<LockoutConfig>, ledgers: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: LockoutConfig::ensure_sanitized(config),
            ledgers,
            clock,
            #[cfg(feature = "monitoring")]
            metrics: None,
        }
    }

    #[cfg(feature = "monitoring")]
    pub fn with_metrics(mut self, metrics: Arc<LockoutMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 记录一次成功注册
    ///
    /// 未启用注册限流时不做任何事并返回 `None`，否则返回窗口内的注册次数。
    pub async fn add_registration(&self, address: &str) -> Result<Option<u32>, LockoutError> {
        self.add_registration_at(address, self.clock.now()).await
    }

    #[instrument(skip(self), fields(address = %address))]
    pub async fn add_registration_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, LockoutError> {
        if !self.config.register_enforce {
            return Ok(None);
        }

        let mut set = LedgerSet::load(&self.ledgers).await?;

        let count = match (
            set.registrations.get(address),
            set.registrations_valid.get(address),
        ) {
            (Some(count), Some(valid)) if now < *valid => count.saturating_add(1),
            _ => 1,
        };
        set.registrations.insert(address.to_string(), count);
        set.registrations_valid
            .insert(address.to_string(), now + self.config.register_period());
        set.mark_dirty(LedgerName::Registrations);
        set.mark_dirty(LedgerName::RegistrationsValid);

        cleanup::sweep(&mut set, now);
        set.persist(&self.ledgers).await?;

        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics.record_registration();
        }

        if count == self.config.register_allowed {
            info!("Address {} reached the registration limit", address);
            self.ledgers
                .increment_total(LedgerName::RegLockoutsTotal)
                .await?;
        } else {
            debug!("Registration {} recorded for {}", count, address);
        }

        Ok(Some(count))
    }

    /// 地址是否还能注册
    pub async fn is_registration_allowed(&self, address: &str) -> Result<bool, LockoutError> {
        self.is_registration_allowed_at(address, self.clock.now())
            .await
    }

    pub async fn is_registration_allowed_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, LockoutError> {
        if !self.config.register_enforce {
            return Ok(true);
        }

        let valid: TimeLedger = self.ledgers.load(LedgerName::RegistrationsValid).await?;
        let live = valid.get(address).is_some_and(|until| now <= *until);
        if !live {
            return Ok(true);
        }

        let registrations: CountLedger = self.ledgers.load(LedgerName::Registrations).await?;
        let allowed = registrations
            .get(address)
            .map_or(true, |count| *count < self.config.register_allowed);

        #[cfg(feature = "monitoring")]
        if !allowed {
            if let Some(metrics) = &self.metrics {
                metrics.record_registration_denied();
            }
        }

        Ok(allowed)
    }

    /// 当前被限制注册的地址数
    pub async fn active_registration_lockouts(&self) -> Result<usize, LockoutError> {
        let now = self.clock.now();
        let valid: TimeLedger = self.ledgers.load(LedgerName::RegistrationsValid).await?;
        let registrations: CountLedger = self.ledgers.load(LedgerName::Registrations).await?;

        Ok(count_active_lockouts(
            &registrations,
            &valid,
            self.config.register_allowed,
            now,
        ))
    }
}

/// 窗口未过期且注册次数达到上限的地址数
pub(crate) fn count_active_lockouts(
    registrations: &CountLedger,
    valid: &TimeLedger,
    allowed: u32,
    now: DateTime<Utc>,
) -> usize {
    registrations
        .iter()
        .filter(|(address, count)| {
            **count >= allowed && valid.get(*address).is_some_and(|until| *until >= now)
        })
        .count()
}
