//! Redis集成测试
//!
//! 需要本地Redis服务器

use crate::common::*;
use loginward::config::LockoutConfig;
use loginward::redis_storage::{RedisConfig, RedisStore};
use loginward::storage::KeyValueStore;
use loginward::LoginGuard;
use std::sync::Arc;

const REDIS_URL: &str = "redis://localhost:6379";

fn unique_prefix(name: &str) -> String {
    format!("loginward-test:{}:{}:", name, chrono::Utc::now().timestamp_micros())
}

/// 测试Redis连接
#[tokio::test]
#[ignore] // 需要Redis服务器运行
async fn test_redis_connection() {
    let store = RedisStore::new(RedisConfig::new(REDIS_URL)).await.unwrap();
    assert!(store.ping().await.is_ok());
}

/// 测试比较并交换
#[tokio::test]
#[ignore]
async fn test_redis_compare_and_swap() {
    let store = RedisStore::new(RedisConfig::new(REDIS_URL)).await.unwrap();
    let key = format!("{}cas", unique_prefix("cas"));

    assert!(store.compare_and_swap(&key, None, "1").await.unwrap());
    assert!(!store.compare_and_swap(&key, None, "2").await.unwrap());
    assert!(!store.compare_and_swap(&key, Some("0"), "2").await.unwrap());
    assert!(store.compare_and_swap(&key, Some("1"), "2").await.unwrap());
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("2"));

    store.delete(&key).await.unwrap();
    assert!(store.get(&key).await.unwrap().is_none());
}

/// 测试两个守卫通过Redis共享锁定状态
#[tokio::test]
#[ignore]
async fn test_redis_shared_lockout() {
    let store = Arc::new(RedisStore::new(RedisConfig::new(REDIS_URL)).await.unwrap());
    let clock = manual_clock();
    let mut config = LockoutConfig::default();
    config.key_prefix = unique_prefix("shared");

    let first = LoginGuard::builder(store.clone())
        .config(config.clone())
        .clock(clock.clone())
        .build();
    let second = LoginGuard::builder(store.clone())
        .config(config)
        .clock(clock.clone())
        .build();

    for _ in 0..4 {
        first.engine().record_failure("10.20.0.1", "").await.unwrap();
    }
    assert!(!second.gatekeeper().is_allowed("10.20.0.1").await.unwrap());

    let stats = second.admin().stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 1);
    assert_eq!(stats.lockouts_now, 1);

    clock.advance_secs(1201);
    assert!(second.gatekeeper().is_allowed("10.20.0.1").await.unwrap());
}

/// 测试连接失败
#[tokio::test]
#[ignore]
async fn test_redis_unreachable() {
    let config = RedisConfig::new("redis://127.0.0.1:1").max_retries(1);
    assert!(RedisStore::new(config).await.is_err());
}
