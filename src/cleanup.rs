//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 账本清理
//!
//! 每次修改账本后运行，清除过期锁定、过期计数以及失去有效期记录的计数。
//! 清理是幂等的：紧接着再运行一次不会有任何改动。

use crate::error::LockoutError;
use crate::ledger::{CountLedger, LedgerName, LedgerSet, LedgerStore, TimeLedger};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// 清理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 清除的过期锁定数
    pub lockouts_purged: usize,
    /// 清除的失败计数数
    pub retries_purged: usize,
    /// 清除的注册计数数
    pub registrations_purged: usize,
}

impl SweepReport {
    pub fn changed(&self) -> bool {
        self.lockouts_purged > 0 || self.retries_purged > 0 || self.registrations_purged > 0
    }
}

/// 清除 `until < now` 的条目，返回清除数量
pub fn purge_expired(ledger: &mut TimeLedger, now: DateTime<Utc>) -> usize {
    let before = ledger.len();
    ledger.retain(|_, until| *until >= now);
    before - ledger.len()
}

/// 清除过期的计数窗口及其计数，再清除没有有效期记录的计数
///
/// 返回被清除的计数条目数，以及有效期账本是否改动。
pub fn purge_counters(
    counts: &mut CountLedger,
    valid: &mut TimeLedger,
    now: DateTime<Utc>,
) -> (usize, bool) {
    let before = counts.len();
    let valid_purged = purge_expired(valid, now) > 0;
    counts.retain(|address, _| valid.contains_key(address));
    (before - counts.len(), valid_purged)
}

/// 在工作集上执行清理并标记改动的账本
pub fn sweep(set: &mut LedgerSet, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    report.lockouts_purged = purge_expired(&mut set.lockouts, now);
    if report.lockouts_purged > 0 {
        set.mark_dirty(LedgerName::Lockouts);
    }

    let (retries_purged, valid_changed) =
        purge_counters(&mut set.retries, &mut set.retries_valid, now);
    report.retries_purged = retries_purged;
    if retries_purged > 0 {
        set.mark_dirty(LedgerName::Retries);
    }
    if valid_changed {
        set.mark_dirty(LedgerName::RetriesValid);
    }

    let (registrations_purged, valid_changed) =
        purge_counters(&mut set.registrations, &mut set.registrations_valid, now);
    report.registrations_purged = registrations_purged;
    if registrations_purged > 0 {
        set.mark_dirty(LedgerName::Registrations);
    }
    if valid_changed {
        set.mark_dirty(LedgerName::RegistrationsValid);
    }

    if report.changed() {
        debug!(
            "Sweep purged {} lockouts, {} retries, {} registrations",
            report.lockouts_purged, report.retries_purged, report.registrations_purged
        );
    }
    report
}

/// 加载账本、清理并写回改动
#[instrument(skip(ledgers))]
pub async fn run(ledgers: &LedgerStore, now: DateTime<Utc>) -> Result<SweepReport, LockoutError> {
    let mut set = LedgerSet::load(ledgers).await?;
    let report = sweep(&mut set, now);
    set.persist(ledgers).await?;
    Ok(report)
}
