//! 端到端测试：失败计数到长锁定的完整流程
//!
//! 测试场景（每 4 次失败锁定 20 分钟，第 4 次锁定为 24 小时长锁定）：
//! 1. 前 3 次失败只计数
//! 2. 第 4 次失败触发普通锁定
//! 3. 锁定到期后继续累计，每 4 次再锁定一次
//! 4. 第 16 次失败触发长锁定，计数被清除
//! 5. 长锁定到期后重新从 1 开始计数

use crate::common::*;
use loginward::clock::Clock;
use loginward::lockout::{FailureOutcome, LockoutKind};

const IP: &str = "198.51.100.200";

#[tokio::test]
async fn test_escalation_to_long_lockout() {
    let env = TestEnv::new(email_config());
    let mut lockouts = Vec::new();

    for failure in 1..=16u32 {
        let outcome = env.fail_login(IP, "admin").await;
        match outcome {
            FailureOutcome::Counted { retries, remaining } => {
                assert_eq!(retries, failure);
                assert_eq!(remaining, 4 - failure % 4);
                assert!(env.can_login(IP).await);
            }
            FailureOutcome::LockedOut {
                kind,
                until,
                retries,
            } => {
                assert_eq!(retries, failure);
                assert_eq!(failure % 4, 0);
                assert!(!env.can_login(IP).await);

                // 锁定期间的失败不计数
                assert_eq!(
                    env.fail_login(IP, "admin").await,
                    FailureOutcome::AlreadyLockedOut
                );

                lockouts.push(kind);
                if kind == LockoutKind::Normal {
                    assert_eq!(until, env.clock.now() + chrono::Duration::seconds(1200));
                    env.clock.advance_secs(1201);
                }
            }
            FailureOutcome::AlreadyLockedOut => panic!("unexpected lockout at {}", failure),
        }
    }

    assert_eq!(
        lockouts,
        vec![
            LockoutKind::Normal,
            LockoutKind::Normal,
            LockoutKind::Normal,
            LockoutKind::Long
        ]
    );

    let stats = env.guard.admin().stats().await.unwrap();
    assert_eq!(stats.lockouts_total, 4);
    assert_eq!(stats.lockouts_now, 1);

    let log = env.guard.admin().log_entries().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].count, 4);

    // 默认每 4 次锁定发一封，第 4 次同时是长锁定
    assert_eq!(env.mailer.sent().len(), 1);

    // 长锁定到期后重新计数
    env.clock.advance_secs(86401);
    assert!(env.can_login(IP).await);
    assert_eq!(
        env.fail_login(IP, "admin").await,
        FailureOutcome::Counted {
            retries: 1,
            remaining: 3
        }
    );
}

#[tokio::test]
async fn test_quiet_period_forgives_failures() {
    let env = TestEnv::new(email_config());

    for _ in 0..3 {
        env.fail_login(IP, "").await;
    }
    env.clock.advance_secs(86400 + 1);

    // 有效期已过，之前的 3 次失败不再计入
    for _ in 0..3 {
        assert!(!env.fail_login(IP, "").await.is_lockout());
    }
    assert!(env.fail_login(IP, "").await.is_lockout());
}
