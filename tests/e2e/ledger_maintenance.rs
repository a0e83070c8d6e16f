//! 端到端测试：账本维护
//!
//! 测试场景：
//! 1. 任意写入都会顺带清除其他地址的过期记录
//! 2. 清理幂等
//! 3. 损坏的账本按空账本处理并在下次写入时修复
//! 4. 计数与有效期不一致时清理会修复

use crate::common::*;
use loginward::cleanup;
use loginward::config::LockoutConfig;
use loginward::ledger::{CountLedger, LedgerName, LedgerStore, TimeLedger};
use loginward::storage::KeyValueStore;

fn ledgers(env: &TestEnv) -> LedgerStore {
    LedgerStore::new(env.store.clone(), "loginward:")
}

#[tokio::test]
async fn test_write_purges_stale_entries_of_others() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login("10.40.0.1", "").await;
    }
    env.fail_login("10.40.0.2", "").await;

    // 两个地址的锁定和计数都已过期
    env.clock.advance_secs(86401);
    env.fail_login("10.40.0.3", "").await;

    let ledgers = ledgers(&env);
    let lockouts: TimeLedger = ledgers.load(LedgerName::Lockouts).await.unwrap();
    let retries: CountLedger = ledgers.load(LedgerName::Retries).await.unwrap();
    assert!(lockouts.is_empty());
    assert_eq!(retries.len(), 1);
    assert_eq!(retries.get("10.40.0.3"), Some(&1));
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login("10.41.0.1", "").await;
    }
    let ctx = env.guard.begin(
        &request_from("10.41.0.2"),
        loginward::LoginAction::Register,
    );
    env.guard.on_registration_success(&ctx).await.unwrap();

    env.clock.advance_secs(86401);
    let ledgers = ledgers(&env);
    let now = t0() + chrono::Duration::seconds(86401);

    let first = cleanup::run(&ledgers, now).await.unwrap();
    assert_eq!(first.lockouts_purged, 1);
    assert_eq!(first.retries_purged, 1);
    assert_eq!(first.registrations_purged, 1);

    let second = cleanup::run(&ledgers, now).await.unwrap();
    assert!(!second.changed());
}

#[tokio::test]
async fn test_corrupt_lockouts_recovered() -> anyhow::Result<()> {
    let env = TestEnv::new(LockoutConfig::default());
    env.store.set("loginward:lockouts", "\u{0}garbage").await?;

    // 损坏的锁定账本视为没有锁定
    assert!(env.can_login("10.42.0.1").await);

    for _ in 0..4 {
        env.fail_login("10.42.0.1", "").await;
    }
    assert!(!env.can_login("10.42.0.1").await);

    let raw = env
        .store
        .get("loginward:lockouts")
        .await?
        .ok_or_else(|| anyhow::anyhow!("lockouts ledger missing"))?;
    let lockouts: TimeLedger = serde_json::from_str(&raw)?;
    assert!(lockouts.contains_key("10.42.0.1"));
    Ok(())
}

#[tokio::test]
async fn test_orphan_counter_removed() {
    let env = TestEnv::new(LockoutConfig::default());
    env.store
        .set("loginward:retries", r#"{"10.43.0.1": 3}"#)
        .await
        .unwrap();

    let report = cleanup::run(&ledgers(&env), t0()).await.unwrap();
    assert_eq!(report.retries_purged, 1);

    // 没有有效期的计数不会被延续
    assert_eq!(
        env.fail_login("10.43.0.1", "").await,
        loginward::FailureOutcome::Counted {
            retries: 1,
            remaining: 3
        }
    );
}
