//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配置模块
//!
//! 定义登录锁定与注册限流的配置结构。每个选项对应一个强类型字段，
//! 加载后经过 [`LockoutConfig::sanitized`] 修正，修正过程从不失败。

use crate::constants::*;
use crate::error::LockoutError;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::warn;

/// 客户端地址来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClientType {
    /// 直接取连接的远端地址
    #[default]
    Direct,
    /// 取反向代理写入的 X-Forwarded-For 头
    Proxy,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Direct => "direct",
            ClientType::Proxy => "proxy",
        }
    }
}

impl From<String> for ClientType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" | "remote_addr" => ClientType::Direct,
            "proxy" | "http_x_forwarded_for" => ClientType::Proxy,
            other => {
                warn!("Unknown client_type '{}', falling back to direct", other);
                ClientType::Direct
            }
        }
    }
}

impl From<ClientType> for String {
    fn from(value: ClientType) -> Self {
        value.as_str().to_string()
    }
}

/// 锁定通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    /// 写入锁定日志账本
    Log,
    /// 发送邮件给管理员
    Email,
}

impl NotifyChannel {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Some(NotifyChannel::Log),
            "email" => Some(NotifyChannel::Email),
            _ => None,
        }
    }
}

/// 锁定与注册限流配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// 客户端地址来源
    pub client_type: ClientType,
    /// 触发一次锁定前允许的失败次数
    pub allowed_retries: u32,
    /// 普通锁定时长（秒）
    pub lockout_duration: u64,
    /// 触发长锁定前允许的普通锁定次数
    pub allowed_lockouts: u32,
    /// 长锁定时长（秒）
    pub long_duration: u64,
    /// 失败计数有效期（秒）
    pub valid_duration: u64,
    /// 锁定通知渠道，接受列表或逗号分隔字符串
    #[serde(deserialize_with = "deserialize_notify")]
    pub lockout_notify: Vec<NotifyChannel>,
    /// 每隔多少次锁定发送一次邮件
    pub notify_email_after: u32,
    /// 是否限制注册
    pub register_enforce: bool,
    /// 注册窗口内允许的注册次数
    pub register_allowed: u32,
    /// 注册窗口（秒）
    pub register_duration: u64,
    /// 通知邮件主题中的站点名
    pub site_name: String,
    /// 管理员邮箱
    pub admin_email: Option<String>,
    /// 账本键前缀
    pub key_prefix: String,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            client_type: ClientType::Direct,
            allowed_retries: DEFAULT_ALLOWED_RETRIES,
            lockout_duration: DEFAULT_LOCKOUT_DURATION_SECS,
            allowed_lockouts: DEFAULT_ALLOWED_LOCKOUTS,
            long_duration: DEFAULT_LONG_DURATION_SECS,
            valid_duration: DEFAULT_VALID_DURATION_SECS,
            lockout_notify: vec![NotifyChannel::Log],
            notify_email_after: DEFAULT_NOTIFY_EMAIL_AFTER,
            register_enforce: true,
            register_allowed: DEFAULT_REGISTER_ALLOWED,
            register_duration: DEFAULT_REGISTER_DURATION_SECS,
            site_name: DEFAULT_SITE_NAME.to_string(),
            admin_email: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl LockoutConfig {
    /// 从YAML解析并修正配置
    pub fn from_yaml_str(content: &str) -> Result<Self, LockoutError> {
        let config: LockoutConfig = serde_yaml::from_str(content)?;
        Ok(config.sanitized())
    }

    /// 从TOML解析并修正配置
    pub fn from_toml_str(content: &str) -> Result<Self, LockoutError> {
        let config: LockoutConfig = toml::from_str(content)?;
        Ok(config.sanitized())
    }

    /// 修正不一致的取值
    ///
    /// 计数类选项至少为 1，`notify_email_after` 限制在 `1..=allowed_lockouts`，
    /// 时长不超过 [`MAX_DURATION_SECS`]，通知渠道去重。
    pub fn sanitized(mut self) -> Self {
        self.allowed_retries = self.allowed_retries.max(1);
        self.allowed_lockouts = self.allowed_lockouts.max(1);
        self.register_allowed = self.register_allowed.max(1);
        self.notify_email_after = self.notify_email_after.max(1).min(self.allowed_lockouts);

        self.lockout_duration = self.lockout_duration.min(MAX_DURATION_SECS);
        self.long_duration = self.long_duration.min(MAX_DURATION_SECS);
        self.valid_duration = self.valid_duration.min(MAX_DURATION_SECS);
        self.register_duration = self.register_duration.min(MAX_DURATION_SECS);

        let mut channels = Vec::with_capacity(self.lockout_notify.len());
        for channel in self.lockout_notify.drain(..) {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        self.lockout_notify = channels;

        self.admin_email = self
            .admin_email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());

        if self.key_prefix.is_empty() {
            self.key_prefix = DEFAULT_KEY_PREFIX.to_string();
        }

        self
    }

    /// 共享配置已修正时原样返回，否则返回修正后的副本
    pub fn ensure_sanitized(config: Arc<LockoutConfig>) -> Arc<LockoutConfig> {
        let repaired = config.as_ref().clone().sanitized();
        if repaired == *config {
            config
        } else {
            warn!("Repairing inconsistent lockout configuration");
            Arc::new(repaired)
        }
    }

    /// 校验配置
    ///
    /// 运行时从不依赖此方法；供管理工具在保存配置前提示问题。
    pub fn validate(&self) -> Result<(), String> {
        if self.allowed_retries == 0 {
            return Err("allowed_retries 必须大于0".to_string());
        }
        if self.allowed_lockouts == 0 {
            return Err("allowed_lockouts 必须大于0".to_string());
        }
        if self.notify_email_after == 0 || self.notify_email_after > self.allowed_lockouts {
            return Err(format!(
                "notify_email_after 必须在 1..={} 之间",
                self.allowed_lockouts
            ));
        }
        if self.key_prefix.is_empty() {
            return Err("key_prefix 不能为空".to_string());
        }
        if self.notifies(NotifyChannel::Email) {
            match &self.admin_email {
                Some(email) if email.contains('@') => {}
                Some(email) => return Err(format!("无效的管理员邮箱: {}", email)),
                None => return Err("启用邮件通知时必须配置 admin_email".to_string()),
            }
        }
        Ok(())
    }

    /// 是否启用指定通知渠道
    pub fn notifies(&self, channel: NotifyChannel) -> bool {
        self.lockout_notify.contains(&channel)
    }

    /// 触发长锁定的失败次数
    pub fn retries_long(&self) -> u32 {
        self.allowed_retries.saturating_mul(self.allowed_lockouts)
    }

    /// 普通锁定时长
    pub fn lockout_period(&self) -> chrono::Duration {
        seconds(self.lockout_duration)
    }

    /// 长锁定时长
    pub fn long_period(&self) -> chrono::Duration {
        seconds(self.long_duration)
    }

    /// 失败计数有效期
    pub fn valid_period(&self) -> chrono::Duration {
        seconds(self.valid_duration)
    }

    /// 注册窗口
    pub fn register_period(&self) -> chrono::Duration {
        seconds(self.register_duration)
    }

    /// 设置通知渠道
    pub fn with_notify(mut self, channels: Vec<NotifyChannel>) -> Self {
        self.lockout_notify = channels;
        self
    }

    /// 设置管理员邮箱
    pub fn with_admin_email(mut self, email: impl Into<String>) -> Self {
        self.admin_email = Some(email.into());
        self
    }

    /// 设置客户端地址来源
    pub fn with_client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = client_type;
        self
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NotifySpec {
    List(Vec<String>),
    Csv(String),
}

/// 解析通知渠道，未知取值直接丢弃
fn deserialize_notify<'de, D>(deserializer: D) -> Result<Vec<NotifyChannel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match NotifySpec::deserialize(deserializer)? {
        NotifySpec::List(items) => items,
        NotifySpec::Csv(value) => value.split(',').map(|s| s.to_string()).collect(),
    };

    Ok(raw
        .iter()
        .filter(|item| !item.trim().is_empty())
        .filter_map(|item| {
            let channel = NotifyChannel::parse(item);
            if channel.is_none() {
                warn!("Dropping unknown lockout_notify channel '{}'", item);
            }
            channel
        })
        .collect())
}
