//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 管理接口
//!
//! 锁定统计、锁定日志查看以及各项重置操作。重置是对指定账本的直接覆盖。

use crate::address::{AddressResolver, ClientRequest};
use crate::cleanup;
use crate::clock::Clock;
use crate::config::{ClientType, LockoutConfig};
use crate::error::LockoutError;
use crate::ledger::{CountLedger, LedgerName, LedgerStore, LogLedger, TimeLedger};
use crate::registration::count_active_lockouts;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// 锁定统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockoutStats {
    /// 累计锁定次数
    pub lockouts_total: u64,
    /// 当前被锁定的地址数
    pub lockouts_now: usize,
    /// 累计达到注册上限的次数
    pub reg_lockouts_total: u64,
    /// 当前被限制注册的地址数
    pub reg_lockouts_now: usize,
}

/// 锁定日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub address: String,
    pub username: String,
    /// 该地址以该用户名触发的锁定次数
    pub count: u64,
}

/// 管理接口
pub struct LockoutAdmin {
    config: Arc<LockoutConfig>,
    ledgers: LedgerStore,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LockoutAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutAdmin")
            .field("ledgers", &self.ledgers)
            .finish()
    }
}

impl LockoutAdmin {
    pub fn new(config: Arc<LockoutConfig>, ledgers: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: LockoutConfig::ensure_sanitized(config),
            ledgers,
            clock,
        }
    }

    /// 清理过期记录后汇总统计
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<LockoutStats, LockoutError> {
        let now = self.clock.now();
        cleanup::run(&self.ledgers, now).await?;

        let lockouts: TimeLedger = self.ledgers.load(LedgerName::Lockouts).await?;
        let registrations: CountLedger = self.ledgers.load(LedgerName::Registrations).await?;
        let registrations_valid: TimeLedger =
            self.ledgers.load(LedgerName::RegistrationsValid).await?;

        Ok(LockoutStats {
            lockouts_total: self.ledgers.load_total(LedgerName::LockoutsTotal).await?,
            lockouts_now: lockouts.values().filter(|until| now <= **until).count(),
            reg_lockouts_total: self
                .ledgers
                .load_total(LedgerName::RegLockoutsTotal)
                .await?,
            reg_lockouts_now: count_active_lockouts(
                &registrations,
                &registrations_valid,
                self.config.register_allowed,
                now,
            ),
        })
    }

    /// 锁定日志，按地址和用户名排序
    pub async fn log_entries(&self) -> Result<Vec<LogEntry>, LockoutError> {
        let log: LogLedger = self.ledgers.load(LedgerName::Logged).await?;

        let mut entries: Vec<LogEntry> = log
            .into_iter()
            .flat_map(|(address, users)| {
                users.into_iter().map(move |(username, count)| LogEntry {
                    address: address.clone(),
                    username,
                    count,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            a.address
                .cmp(&b.address)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(entries)
    }

    /// 清空锁定日志
    pub async fn clear_log(&self) -> Result<(), LockoutError> {
        self.ledgers.reset::<LogLedger>(LedgerName::Logged).await?;
        info!("Cleared lockout log");
        Ok(())
    }

    /// 锁定总数归零
    pub async fn reset_total(&self) -> Result<(), LockoutError> {
        self.ledgers.reset::<u64>(LedgerName::LockoutsTotal).await?;
        info!("Reset lockout count");
        Ok(())
    }

    /// 解除所有当前锁定
    pub async fn reset_current(&self) -> Result<(), LockoutError> {
        self.ledgers.reset::<TimeLedger>(LedgerName::Lockouts).await?;
        info!("Cleared current lockouts");
        Ok(())
    }

    /// 注册限制总数归零
    pub async fn reset_reg_total(&self) -> Result<(), LockoutError> {
        self.ledgers
            .reset::<u64>(LedgerName::RegLockoutsTotal)
            .await?;
        info!("Reset registration lockout count");
        Ok(())
    }

    /// 清空当前注册计数
    pub async fn reset_reg_current(&self) -> Result<(), LockoutError> {
        self.ledgers
            .reset::<CountLedger>(LedgerName::Registrations)
            .await?;
        self.ledgers
            .reset::<TimeLedger>(LedgerName::RegistrationsValid)
            .await?;
        info!("Cleared current registration lockouts");
        Ok(())
    }

    /// 根据请求猜测站点是否部署在反向代理之后
    pub fn guess_client_type(&self, request: &ClientRequest) -> ClientType {
        AddressResolver::guess_client_type(request)
    }
}
