//! 锁定引擎集成测试

use crate::common::*;
use loginward::config::LockoutConfig;
use loginward::ledger::{CountLedger, LedgerName, LedgerStore, TimeLedger};
use loginward::lockout::{FailureOutcome, LockoutKind};
use std::sync::Arc;

const IP: &str = "198.51.100.23";

fn ledgers(env: &TestEnv) -> LedgerStore {
    LedgerStore::new(env.store.clone(), env.guard.config().key_prefix.clone())
}

#[tokio::test]
async fn test_locked_after_last_allowed_retry() {
    let env = TestEnv::new(LockoutConfig::default());

    for _ in 0..3 {
        assert!(!env.fail_login(IP, "admin").await.is_lockout());
        assert!(env.can_login(IP).await);
    }

    assert!(env.fail_login(IP, "admin").await.is_lockout());
    assert!(!env.can_login(IP).await);
}

#[tokio::test]
async fn test_retry_count_survives_normal_lockout() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login(IP, "").await;
    }

    env.clock.advance_secs(1201);
    assert!(env.can_login(IP).await);

    let outcome = env.fail_login(IP, "").await;
    assert_eq!(
        outcome,
        FailureOutcome::Counted {
            retries: 5,
            remaining: 3
        }
    );
}

#[tokio::test]
async fn test_long_lockout_removes_retry_record() {
    let env = TestEnv::new(LockoutConfig::default());

    let mut last = None;
    for round in 0..4 {
        for _ in 0..4 {
            last = Some(env.fail_login(IP, "root").await);
        }
        if round < 3 {
            env.clock.advance_secs(1201);
        }
    }

    match last {
        Some(FailureOutcome::LockedOut { kind, retries, .. }) => {
            assert_eq!(kind, LockoutKind::Long);
            assert_eq!(retries, 16);
        }
        other => panic!("expected long lockout, got {:?}", other),
    }

    let ledgers = ledgers(&env);
    let retries: CountLedger = ledgers.load(LedgerName::Retries).await.unwrap();
    let valid: TimeLedger = ledgers.load(LedgerName::RetriesValid).await.unwrap();
    assert!(retries.get(IP).is_none());
    assert!(valid.get(IP).is_none());

    // 长锁定持续 24 小时
    env.clock.advance_secs(86400);
    assert!(!env.can_login(IP).await);
    env.clock.advance_secs(1);
    assert!(env.can_login(IP).await);
}

#[tokio::test]
async fn test_failure_after_window_starts_over() {
    let env = TestEnv::new(LockoutConfig::default());
    env.fail_login(IP, "").await;
    env.fail_login(IP, "").await;
    env.fail_login(IP, "").await;

    env.clock.advance_secs(86400);
    assert_eq!(
        env.fail_login(IP, "").await,
        FailureOutcome::Counted {
            retries: 1,
            remaining: 3
        }
    );
}

#[tokio::test]
async fn test_addresses_are_independent() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login("10.0.0.1", "").await;
    }
    env.fail_login("10.0.0.2", "").await;

    assert!(!env.can_login("10.0.0.1").await);
    assert!(env.can_login("10.0.0.2").await);
}

#[tokio::test]
async fn test_lockout_increments_total() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login(IP, "").await;
    }
    // 锁定期间的失败不计入
    env.fail_login(IP, "").await;

    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 1);
    assert_eq!(stats.lockouts_now, 1);
}

#[tokio::test]
async fn test_storage_failure_propagates() {
    let store = Arc::new(FlakyStore::new());
    let guard = loginward::LoginGuard::builder(store.clone())
        .clock(manual_clock())
        .build();

    store.set_down(true);
    let result = guard.engine().record_failure(IP, "").await;
    assert!(matches!(
        result,
        Err(loginward::LockoutError::StorageError(_))
    ));
}

fn guard_on(
    store: Arc<FlakyStore>,
    allowed_retries: u32,
    allowed_lockouts: u32,
) -> loginward::LoginGuard {
    let mut config = LockoutConfig::default();
    config.allowed_retries = allowed_retries;
    config.allowed_lockouts = allowed_lockouts;
    loginward::LoginGuard::builder(store)
        .config(config)
        .clock(manual_clock())
        .build()
}

#[tokio::test]
async fn test_rejected_long_lockout_write_keeps_counter() {
    let store = Arc::new(FlakyStore::new());
    let guard = guard_on(store.clone(), 2, 1);
    let engine = guard.engine();

    assert_eq!(
        engine.record_failure(IP, "").await.unwrap(),
        FailureOutcome::Counted {
            retries: 1,
            remaining: 1
        }
    );

    store.fail_writes_to(Some(":lockouts"));
    assert!(engine.record_failure(IP, "").await.is_err());

    // 锁定没有落盘时计数也不能被清除
    let ledgers = LedgerStore::new(store.clone(), "loginward:");
    let retries: CountLedger = ledgers.load(LedgerName::Retries).await.unwrap();
    let valid: TimeLedger = ledgers.load(LedgerName::RetriesValid).await.unwrap();
    assert_eq!(retries.get(IP), Some(&1));
    assert!(valid.contains_key(IP));

    store.fail_writes_to(None);
    match engine.record_failure(IP, "").await.unwrap() {
        FailureOutcome::LockedOut { kind, retries, .. } => {
            assert_eq!(kind, LockoutKind::Long);
            assert_eq!(retries, 2);
        }
        other => panic!("expected long lockout, got {:?}", other),
    }
    assert!(!guard.gatekeeper().is_allowed(IP).await.unwrap());
}

#[tokio::test]
async fn test_rejected_normal_lockout_write_does_not_advance_counter() {
    let store = Arc::new(FlakyStore::new());
    let guard = guard_on(store.clone(), 2, 4);
    let engine = guard.engine();

    engine.record_failure(IP, "").await.unwrap();
    store.fail_writes_to(Some(":lockouts"));
    assert!(engine.record_failure(IP, "").await.is_err());
    store.fail_writes_to(None);

    assert!(guard.gatekeeper().is_allowed(IP).await.unwrap());
    // 下一次失败立即锁定，而不是等到第 4 次
    assert!(engine.record_failure(IP, "").await.unwrap().is_lockout());
    assert!(!guard.gatekeeper().is_allowed(IP).await.unwrap());
}
