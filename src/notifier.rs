//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 锁定通知
//!
//! 每次产生新锁定时按配置的渠道通知：写入锁定日志账本，或通过宿主提供的
//! [`Mailer`] 给管理员发送摘要邮件。通知失败只记录日志，不影响锁定本身。

use crate::config::{LockoutConfig, NotifyChannel};
use crate::error::{LockoutError, MailerError};
use crate::ledger::{LedgerName, LedgerStore, LogLedger};
use crate::lockout::{LockoutEvent, LockoutKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// 待发送的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// 收件人
    pub to: String,
    /// 主题
    pub subject: String,
    /// 正文
    pub body: String,
}

/// 邮件发送接口，由宿主应用实现
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, email: Email) -> Result<(), MailerError>;
}

/// 锁定通知器
pub struct Notifier {
    config: Arc<LockoutConfig>,
    ledgers: LedgerStore,
    mailer: Option<Arc<dyn Mailer>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("channels", &self.config.lockout_notify)
            .field("has_mailer", &self.mailer.is_some())
            .finish()
    }
}

impl Notifier {
    pub fn new(
        config: Arc<LockoutConfig>,
        ledgers: LedgerStore,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            config: LockoutConfig::ensure_sanitized(config),
            ledgers,
            mailer,
        }
    }

    /// 分发锁定事件到所有已配置的渠道
    #[instrument(skip(self, event), fields(address = %event.address, kind = ?event.kind))]
    pub async fn notify(&self, event: &LockoutEvent) {
        for channel in &self.config.lockout_notify {
            match channel {
                NotifyChannel::Log => {
                    if let Err(e) = self.append_log(event).await {
                        error!("Failed to append lockout log for {}: {}", event.address, e);
                    }
                }
                NotifyChannel::Email => {
                    if let Err(e) = self.send_summary(event).await {
                        error!("Failed to send lockout email for {}: {}", event.address, e);
                    }
                }
            }
        }
    }

    /// 锁定日志中地址和用户名对应的计数加一
    async fn append_log(&self, event: &LockoutEvent) -> Result<(), LockoutError> {
        let address = event.address.clone();
        let username = event.username.clone();
        self.ledgers
            .update::<LogLedger, _>(LedgerName::Logged, |log| {
                let count = log
                    .entry(address.clone())
                    .or_default()
                    .entry(username.clone())
                    .or_insert(0);
                *count = count.saturating_add(1);
            })
            .await?;
        debug!("Logged lockout of {} ({})", event.address, event.username);
        Ok(())
    }

    async fn send_summary(&self, event: &LockoutEvent) -> Result<(), LockoutError> {
        if !self.should_email(event) {
            debug!("Skipping lockout email for {}", event.address);
            return Ok(());
        }

        let Some(email) = self.compose_email(event) else {
            warn!("Email notification enabled but admin_email is not set, skipping");
            return Ok(());
        };

        let Some(mailer) = &self.mailer else {
            warn!("Email notification enabled but no mailer is configured, skipping");
            return Ok(());
        };

        mailer.send_email(email).await?;
        debug!("Sent lockout email for {}", event.address);
        Ok(())
    }

    /// 是否为此次锁定发送邮件
    ///
    /// 长锁定总是发送；普通锁定每 `notify_email_after` 次发送一次。
    pub fn should_email(&self, event: &LockoutEvent) -> bool {
        match event.kind {
            LockoutKind::Long => true,
            LockoutKind::Normal => {
                let lockouts = event.retries / self.config.allowed_retries;
                lockouts % self.config.notify_email_after == 0
            }
        }
    }

    /// 生成摘要邮件，未配置管理员邮箱时返回 `None`
    pub fn compose_email(&self, event: &LockoutEvent) -> Option<Email> {
        let to = self.config.admin_email.clone()?;

        let (count, lockouts, when) = match event.kind {
            LockoutKind::Long => {
                let hours = rounded_units(self.config.long_duration, 3600);
                (
                    self.config.retries_long(),
                    self.config.allowed_lockouts,
                    plural(hours, "hour", "hours"),
                )
            }
            LockoutKind::Normal => {
                let minutes = rounded_units(self.config.lockout_duration, 60);
                (
                    event.retries,
                    event.retries / self.config.allowed_retries,
                    plural(minutes, "minute", "minutes"),
                )
            }
        };

        let subject = format!("[{}] Too many failed login attempts", self.config.site_name);
        let mut body = format!(
            "{} failed login attempts ({} lockout(s)) from IP: {}\r\n\r\n",
            count, lockouts, event.address
        );
        if !event.username.is_empty() {
            body.push_str(&format!("Last user attempted: {}\r\n\r\n", event.username));
        }
        body.push_str(&format!("IP was blocked for {}", when));

        Some(Email { to, subject, body })
    }
}

/// 秒数换算为四舍五入的单位数
fn rounded_units(secs: u64, unit: u64) -> u64 {
    (secs as f64 / unit as f64).round() as u64
}

fn plural(n: u64, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}
