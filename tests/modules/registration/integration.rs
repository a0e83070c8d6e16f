//! 注册限流集成测试

use crate::common::*;
use loginward::config::LockoutConfig;
use loginward::guard::LoginAction;

const IP: &str = "203.0.113.8";

async fn register(env: &TestEnv, ip: &str) -> bool {
    let mut ctx = env.guard.begin(&request_from(ip), LoginAction::Register);
    let verdict = env.guard.on_registration_attempt(&mut ctx).await;
    if verdict.is_allowed() {
        env.guard.on_registration_success(&ctx).await.unwrap();
    }
    verdict.is_allowed()
}

#[tokio::test]
async fn test_register_allowed_is_last_allowed() {
    let env = TestEnv::new(LockoutConfig::default());
    assert!(register(&env, IP).await);
    assert!(register(&env, IP).await);
    assert!(register(&env, IP).await);
    assert!(!register(&env, IP).await);

    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.reg_lockouts_total, 1);
    assert_eq!(stats.reg_lockouts_now, 1);
}

#[tokio::test]
async fn test_registration_window_expires() {
    let mut config = LockoutConfig::default();
    config.register_allowed = 1;
    config.register_duration = 3600;
    let env = TestEnv::new(config);

    assert!(register(&env, IP).await);
    assert!(!register(&env, IP).await);

    env.clock.advance_secs(3601);
    assert!(register(&env, IP).await);

    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.reg_lockouts_total, 2);
}

#[tokio::test]
async fn test_registration_denial_message() {
    let mut config = LockoutConfig::default();
    config.register_allowed = 1;
    config.register_duration = 1800;
    let env = TestEnv::new(config);
    register(&env, IP).await;

    let mut ctx = env.guard.begin(&request_from(IP), LoginAction::Register);
    let verdict = env.guard.on_registration_attempt(&mut ctx).await;
    assert_eq!(
        verdict.message(),
        Some("ERROR: Too many new user registrations. Please try again in 30 minutes.")
    );
}

#[tokio::test]
async fn test_registration_unlimited_when_not_enforced() {
    let mut config = LockoutConfig::default();
    config.register_enforce = false;
    let env = TestEnv::new(config);

    for _ in 0..10 {
        assert!(register(&env, IP).await);
    }
    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.reg_lockouts_total, 0);
}

#[tokio::test]
async fn test_registration_independent_of_login_lockout() {
    let env = TestEnv::new(LockoutConfig::default());
    for _ in 0..4 {
        env.fail_login(IP, "").await;
    }
    assert!(!env.can_login(IP).await);
    assert!(register(&env, IP).await);
}

#[tokio::test]
async fn test_denial_message_uses_request_time() {
    let mut config = LockoutConfig::default();
    config.register_allowed = 1;
    config.register_duration = 1800;
    let env = TestEnv::new(config);
    register(&env, IP).await;

    let mut ctx = env.guard.begin(&request_from(IP), LoginAction::Register);
    env.clock.advance_secs(600);

    let verdict = env.guard.on_registration_attempt(&mut ctx).await;
    assert_eq!(
        verdict.message(),
        Some("ERROR: Too many new user registrations. Please try again in 30 minutes.")
    );
}
