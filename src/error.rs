//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。

use thiserror::Error;

/// Loginward 错误类型
#[derive(Error, Debug)]
pub enum LockoutError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 存储错误
    #[error("存储错误: {0}")]
    StorageError(#[from] StorageError),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    /// 邮件发送错误
    #[error("邮件发送错误: {0}")]
    MailerError(#[from] MailerError),

    /// 验证错误
    #[error("验证错误: {0}")]
    ValidationError(String),
}

/// 存储错误
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 未找到
    #[error("未找到: {0}")]
    NotFound(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StorageError::QueryError(db_err.to_string()),
            sqlx::Error::PoolTimedOut => StorageError::TimeoutError("连接池超时".to_string()),
            sqlx::Error::PoolClosed => StorageError::ConnectionError("连接池已关闭".to_string()),
            sqlx::Error::RowNotFound => StorageError::NotFound("记录未找到".to_string()),
            _ => StorageError::QueryError(err.to_string()),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StorageError::ConnectionError(err.to_string())
        } else if err.is_timeout() {
            StorageError::TimeoutError(err.to_string())
        } else {
            StorageError::QueryError(err.to_string())
        }
    }
}

/// 邮件发送错误
#[derive(Error, Debug, Clone)]
pub enum MailerError {
    /// 收件人无效
    #[error("收件人无效: {0}")]
    InvalidRecipient(String),

    /// 传输失败
    #[error("传输失败: {0}")]
    Transport(String),
}

/// 宿主应用的放行决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// 允许本次尝试
    Allow,
    /// 拒绝，附带展示给客户端的消息
    Deny(String),
}

impl AttemptVerdict {
    /// 是否放行
    pub fn is_allowed(&self) -> bool {
        matches!(self, AttemptVerdict::Allow)
    }

    /// 拒绝消息
    pub fn message(&self) -> Option<&str> {
        match self {
            AttemptVerdict::Allow => None,
            AttemptVerdict::Deny(msg) => Some(msg),
        }
    }
}
