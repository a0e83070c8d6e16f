//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 日志初始化
//!
//! 为宿主应用安装 `tracing-subscriber` 的 fmt 订阅器。库本身只通过
//! `tracing` 宏输出事件，是否安装订阅器由宿主决定。

use tracing::info;
use tracing_subscriber::EnvFilter;

/// 遥测配置
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// 服务名称
    pub service_name: String,
    /// 默认过滤指令，`RUST_LOG` 存在时以其为准
    pub log_level: String,
    /// 是否输出事件目标
    pub with_target: bool,
    /// 是否使用ANSI颜色
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "loginward".to_string(),
            log_level: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// 创建新的配置
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// 设置默认日志级别
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// 关闭ANSI颜色
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, String> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.log_level)
                .map_err(|e| format!("无效的日志过滤指令 '{}': {}", self.log_level, e)),
        }
    }
}

/// 安装全局日志订阅器
///
/// 已经安装过订阅器时返回错误。
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), String> {
    let filter = config.env_filter()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|e| format!("日志订阅器初始化失败: {}", e))?;

    info!("Tracing initialized for {}", config.service_name);
    Ok(())
}
