//! 存储后端集成测试

use crate::common::*;
use loginward::config::LockoutConfig;
use loginward::ledger::{LedgerName, LedgerStore, TimeLedger};
use loginward::storage::{KeyValueStore, MemoryStore};
use loginward::LoginGuard;
use std::sync::Arc;

#[tokio::test]
async fn test_guards_share_store() {
    let store = Arc::new(MemoryStore::new());
    let clock = manual_clock();
    let first = LoginGuard::builder(store.clone())
        .clock(clock.clone())
        .build();
    let second = LoginGuard::builder(store.clone())
        .clock(clock.clone())
        .build();

    for _ in 0..4 {
        first.engine().record_failure("10.5.0.1", "").await.unwrap();
    }
    assert!(!second.gatekeeper().is_allowed("10.5.0.1").await.unwrap());
}

#[tokio::test]
async fn test_key_prefix_isolates_sites() {
    let store = Arc::new(MemoryStore::new());
    let clock = manual_clock();

    let mut config = LockoutConfig::default();
    config.key_prefix = "site-a:".to_string();
    let site_a = LoginGuard::builder(store.clone())
        .config(config)
        .clock(clock.clone())
        .build();
    let mut config = LockoutConfig::default();
    config.key_prefix = "site-b:".to_string();
    let site_b = LoginGuard::builder(store.clone())
        .config(config)
        .clock(clock.clone())
        .build();

    for _ in 0..4 {
        site_a.engine().record_failure("10.5.0.2", "").await.unwrap();
    }
    assert!(!site_a.gatekeeper().is_allowed("10.5.0.2").await.unwrap());
    assert!(site_b.gatekeeper().is_allowed("10.5.0.2").await.unwrap());
    assert!(store.get("site-a:lockouts").await.unwrap().is_some());
    assert!(store.get("site-b:lockouts").await.unwrap().is_none());
}

#[tokio::test]
async fn test_counted_failure_skips_lockout_ledger_write() {
    let store = Arc::new(FlakyStore::new());
    let guard = LoginGuard::builder(store.clone())
        .clock(manual_clock())
        .build();

    guard.engine().record_failure("10.5.0.3", "").await.unwrap();
    // 计数和有效期两个账本
    assert_eq!(store.writes(), 2);
}

#[tokio::test]
async fn test_ledgers_are_json() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login("10.5.0.4", "").await;
    }

    let raw = env.store.get("loginward:lockouts").await.unwrap().unwrap();
    let parsed: TimeLedger = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        parsed.get("10.5.0.4").copied(),
        Some(t0() + chrono::Duration::seconds(1200))
    );

    let ledgers = LedgerStore::new(env.store.clone(), "loginward:");
    assert_eq!(ledgers.load_total(LedgerName::LockoutsTotal).await.unwrap(), 1);
}

#[tokio::test]
async fn test_corrupt_ledger_treated_as_empty() {
    let env = TestEnv::new(LockoutConfig::default());
    env.store
        .set("loginward:retries", "{not json")
        .await
        .unwrap();

    assert_eq!(
        env.fail_login("10.5.0.5", "").await,
        loginward::FailureOutcome::Counted {
            retries: 1,
            remaining: 3
        }
    );
}
