//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 锁定指标
//!
//! 基于 Prometheus 的计数器，使用独立的注册表，通过 [`LockoutMetrics::gather`]
//! 导出文本格式。

use crate::lockout::LockoutKind;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Duration;
use tracing::error;

/// 锁定与注册指标
#[derive(Clone)]
pub struct LockoutMetrics {
    /// 记录的登录失败数
    pub failures_total: IntCounter,
    /// 普通锁定数
    pub lockouts_total: IntCounter,
    /// 长锁定数
    pub long_lockouts_total: IntCounter,
    /// 被拒绝的登录尝试数
    pub denied_total: IntCounter,
    /// 记录的注册数
    pub registrations_total: IntCounter,
    /// 被拒绝的注册数
    pub registrations_denied_total: IntCounter,
    /// 放行检查延迟分布
    pub check_duration: Histogram,
    registry: Registry,
}

impl std::fmt::Debug for LockoutMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutMetrics")
            .field("failures_total", &self.failures_total.get())
            .field("lockouts_total", &self.lockouts_total.get())
            .field("long_lockouts_total", &self.long_lockouts_total.get())
            .finish()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl LockoutMetrics {
    /// 创建并注册全部指标
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let failures_total = counter(
            &registry,
            "loginward_failures_total",
            "Total number of recorded authentication failures",
        )?;
        let lockouts_total = counter(
            &registry,
            "loginward_lockouts_total",
            "Total number of normal lockouts",
        )?;
        let long_lockouts_total = counter(
            &registry,
            "loginward_long_lockouts_total",
            "Total number of long lockouts",
        )?;
        let denied_total = counter(
            &registry,
            "loginward_denied_total",
            "Total number of authentication attempts denied by a lockout",
        )?;
        let registrations_total = counter(
            &registry,
            "loginward_registrations_total",
            "Total number of recorded registrations",
        )?;
        let registrations_denied_total = counter(
            &registry,
            "loginward_registrations_denied_total",
            "Total number of registrations denied by the throttle",
        )?;

        let check_duration = Histogram::with_opts(
            HistogramOpts::new(
                "loginward_check_duration_seconds",
                "Duration of lockout checks in seconds",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(check_duration.clone()))?;

        Ok(Self {
            failures_total,
            lockouts_total,
            long_lockouts_total,
            denied_total,
            registrations_total,
            registrations_denied_total,
            check_duration,
            registry,
        })
    }

    pub fn record_failure(&self) {
        self.failures_total.inc();
    }

    /// 记录一次锁定
    pub fn record_lockout(&self, kind: LockoutKind) {
        match kind {
            LockoutKind::Normal => self.lockouts_total.inc(),
            LockoutKind::Long => self.long_lockouts_total.inc(),
        }
    }

    /// 记录放行检查
    pub fn record_check(&self, duration: Duration, allowed: bool) {
        self.check_duration.observe(duration.as_secs_f64());
        if !allowed {
            self.denied_total.inc();
        }
    }

    pub fn record_registration(&self) {
        self.registrations_total.inc();
    }

    pub fn record_registration_denied(&self) {
        self.registrations_denied_total.inc();
    }

    /// 收集所有指标并返回Prometheus格式的文本
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
