//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 放行判断与提示消息
//!
//! 只读：回答“地址是否允许登录”“还剩几次机会”“应该显示什么消息”。

use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::constants::{MINUTES_PER_HOUR, SECS_PER_MINUTE};
use crate::error::LockoutError;
use crate::ledger::{CountLedger, LedgerName, LedgerStore, TimeLedger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{instrument, warn};

/// 登录锁定消息前缀
pub const LOGIN_LOCKOUT_PREFIX: &str = "ERROR: Too many failed login attempts. ";

/// 注册限制消息前缀
pub const REGISTRATION_LOCKOUT_PREFIX: &str = "ERROR: Too many new user registrations. ";

/// 无法计算剩余时间时的提示
pub const TRY_AGAIN_LATER: &str = "Please try again later.";

/// 放行判断
pub struct Gatekeeper {
    config: Arc<LockoutConfig>,
    ledgers: LedgerStore,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("allowed_retries", &self.config.allowed_retries)
            .finish()
    }
}

impl Gatekeeper {
    pub fn new(config: Arc<LockoutConfig>, ledgers: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: LockoutConfig::ensure_sanitized(config),
            ledgers,
            clock,
        }
    }

    /// 地址当前没有生效的锁定
    pub async fn is_allowed(&self, address: &str) -> Result<bool, LockoutError> {
        self.is_allowed_at(address, self.clock.now()).await
    }

    #[instrument(skip(self), fields(address = %address))]
    pub async fn is_allowed_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, LockoutError> {
        let lockouts: TimeLedger = self.ledgers.load(LedgerName::Lockouts).await?;
        Ok(!is_live(&lockouts, address, now))
    }

    /// 锁定前剩余的尝试次数
    ///
    /// 没有有效计数，或刚好处在一次锁定的边界上时返回 `None`。
    pub async fn retries_remaining(&self, address: &str) -> Result<Option<u32>, LockoutError> {
        self.retries_remaining_at(address, self.clock.now()).await
    }

    pub async fn retries_remaining_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, LockoutError> {
        let valid: TimeLedger = self.ledgers.load(LedgerName::RetriesValid).await?;
        if !is_live(&valid, address, now) {
            return Ok(None);
        }

        let retries: CountLedger = self.ledgers.load(LedgerName::Retries).await?;
        let Some(count) = retries.get(address) else {
            return Ok(None);
        };

        let allowed = self.config.allowed_retries;
        let used = count % allowed;
        if used == 0 {
            return Ok(None);
        }
        Ok(Some(allowed.saturating_sub(used)))
    }

    /// 登录锁定提示
    pub async fn error_message(&self, address: &str) -> Result<String, LockoutError> {
        self.error_message_at(address, self.clock.now()).await
    }

    pub async fn error_message_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LockoutError> {
        let lockouts: TimeLedger = self.ledgers.load(LedgerName::Lockouts).await?;
        Ok(lockout_message(
            LOGIN_LOCKOUT_PREFIX,
            lockouts.get(address).copied(),
            now,
        ))
    }

    /// 注册限制提示，剩余时间按注册窗口到期时间计算
    pub async fn registration_error_message(&self, address: &str) -> Result<String, LockoutError> {
        self.registration_error_message_at(address, self.clock.now())
            .await
    }

    pub async fn registration_error_message_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LockoutError> {
        let valid: TimeLedger = self.ledgers.load(LedgerName::RegistrationsValid).await?;
        Ok(lockout_message(
            REGISTRATION_LOCKOUT_PREFIX,
            valid.get(address).copied(),
            now,
        ))
    }

    /// 剩余次数提示
    ///
    /// 读取失败时不显示任何内容。
    pub async fn retries_remaining_message(&self, address: &str) -> Option<String> {
        match self.retries_remaining(address).await {
            Ok(remaining) => remaining.map(remaining_message),
            Err(e) => {
                warn!("Failed to read remaining retries for {}: {}", address, e);
                None
            }
        }
    }

    /// 当前应显示的消息：锁定中显示锁定提示，否则显示剩余次数
    pub async fn current_message(&self, address: &str) -> Result<Option<String>, LockoutError> {
        if !self.is_allowed(address).await? {
            return Ok(Some(self.error_message(address).await?));
        }
        Ok(self.retries_remaining_message(address).await)
    }
}

/// 地址在时间账本中存在且 `now <= until`
fn is_live(ledger: &TimeLedger, address: &str, now: DateTime<Utc>) -> bool {
    ledger.get(address).is_some_and(|until| now <= *until)
}

/// 拼接带剩余时间的锁定消息
///
/// 剩余时间向上取整到分钟，超过 60 分钟时向上取整到小时。
pub fn lockout_message(prefix: &str, until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let mut msg = prefix.to_string();

    let secs = match until {
        Some(until) if now < until => {
            let left = until - now;
            let whole = left.num_seconds();
            if left > chrono::Duration::seconds(whole) {
                whole + 1
            } else {
                whole
            }
        }
        _ => {
            msg.push_str(TRY_AGAIN_LATER);
            return msg;
        }
    };

    let minutes = ceil_div(secs, SECS_PER_MINUTE);
    if minutes > MINUTES_PER_HOUR {
        let hours = ceil_div(minutes, MINUTES_PER_HOUR);
        msg.push_str(&format!(
            "Please try again in {} {}.",
            hours,
            if hours == 1 { "hour" } else { "hours" }
        ));
    } else {
        msg.push_str(&format!(
            "Please try again in {} {}.",
            minutes,
            if minutes == 1 { "minute" } else { "minutes" }
        ));
    }
    msg
}

/// 剩余次数消息
pub fn remaining_message(remaining: u32) -> String {
    if remaining == 1 {
        "1 attempt remaining.".to_string()
    } else {
        format!("{} attempts remaining.", remaining)
    }
}

fn ceil_div(value: i64, unit: i64) -> i64 {
    (value + unit - 1) / unit
}
