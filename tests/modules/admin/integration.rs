//! 管理接口集成测试

use crate::common::*;
use loginward::config::{ClientType, LockoutConfig};
use loginward::guard::LoginAction;
use loginward::LockoutStats;

async fn register(env: &TestEnv, ip: &str) {
    let ctx = env.guard.begin(&request_from(ip), LoginAction::Register);
    env.guard.on_registration_success(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_stats_on_empty_store() {
    let env = TestEnv::new(LockoutConfig::default());
    assert_eq!(
        env.guard.admin().stats().await.unwrap(),
        LockoutStats::default()
    );
}

#[tokio::test]
async fn test_stats_drop_expired_lockouts() {
    let env = TestEnv::new(LockoutConfig::default());
    for ip in ["10.1.0.1", "10.1.0.2"] {
        for _ in 0..4 {
            env.fail_login(ip, "").await;
        }
    }

    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 2);
    assert_eq!(stats.lockouts_now, 2);

    env.clock.advance_secs(1201);
    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 2);
    assert_eq!(stats.lockouts_now, 0);
}

#[tokio::test]
async fn test_reset_current_unlocks_everyone() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login("10.2.0.1", "").await;
    }
    assert!(!env.can_login("10.2.0.1").await);

    env.guard.admin().reset_current().await.unwrap();
    assert!(env.can_login("10.2.0.1").await);

    // 总数不受影响
    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 1);
    assert_eq!(stats.lockouts_now, 0);
}

#[tokio::test]
async fn test_reset_total_and_log() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login("10.3.0.1", "eve").await;
    }
    let admin = env.guard.admin();

    admin.reset_total().await.unwrap();
    admin.clear_log().await.unwrap();

    let stats = admin.stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 0);
    assert_eq!(stats.lockouts_now, 1);
    assert!(admin.log_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registration_resets() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..3 {
        register(&env, "10.4.0.1").await;
    }
    let admin = env.guard.admin();

    let stats = admin.stats().await.unwrap();
    assert_eq!(stats.reg_lockouts_total, 1);
    assert_eq!(stats.reg_lockouts_now, 1);

    admin.reset_reg_current().await.unwrap();
    let stats = admin.stats().await.unwrap();
    assert_eq!(stats.reg_lockouts_total, 1);
    assert_eq!(stats.reg_lockouts_now, 0);
    assert!(env
        .guard
        .registrations()
        .is_registration_allowed("10.4.0.1")
        .await
        .unwrap());

    admin.reset_reg_total().await.unwrap();
    assert_eq!(admin.stats().await.unwrap().reg_lockouts_total, 0);
}

#[tokio::test]
async fn test_guess_client_type() {
    let env = TestEnv::new(LockoutConfig::default());
    let admin = env.guard.admin();

    assert_eq!(
        admin.guess_client_type(&request_from("10.0.0.1")),
        ClientType::Direct
    );
    let proxied = request_from("10.0.0.1").with_header("X-Forwarded-For", "203.0.113.1");
    assert_eq!(admin.guess_client_type(&proxied), ClientType::Proxy);
}
