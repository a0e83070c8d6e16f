//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 登录守卫
//!
//! 面向宿主应用的入口，把地址解析、锁定引擎、注册限流、放行判断和管理接口
//! 组合在一起。每个请求开始时调用 [`LoginGuard::begin`] 得到
//! [`AttemptContext`]，后续各个钩子都显式传入这个上下文。
//!
//! # 示例
//!
//! ```rust
//! use loginward::address::ClientRequest;
//! use loginward::guard::{LoginAction, LoginGuard};
//! use loginward::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let guard = LoginGuard::builder(Arc::new(MemoryStore::new())).build();
//!     let request = ClientRequest::new().with_remote_addr("198.51.100.20");
//!
//!     let mut ctx = guard.begin(&request, LoginAction::Login);
//!     guard.track_credentials(&mut ctx, "admin", "hunter2");
//!     assert!(guard.on_authentication_attempt(&mut ctx).await.is_allowed());
//!
//!     // 宿主认证失败
//!     guard.on_authentication_failure(&mut ctx, "admin").await.unwrap();
//! }
//! ```

use crate::address::{AddressResolver, ClientRequest};
use crate::admin::LockoutAdmin;
use crate::clock::{Clock, SystemClock};
use crate::config::LockoutConfig;
use crate::error::{AttemptVerdict, LockoutError};
use crate::gatekeeper::{
    lockout_message, Gatekeeper, LOGIN_LOCKOUT_PREFIX, REGISTRATION_LOCKOUT_PREFIX,
};
use crate::ledger::LedgerStore;
use crate::lockout::{FailureOutcome, LockoutEngine};
#[cfg(feature = "monitoring")]
use crate::metrics::LockoutMetrics;
use crate::notifier::{Mailer, Notifier};
use crate::registration::RegistrationThrottle;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 替换宿主认证错误的通用提示，避免泄露用户名是否存在
pub const GENERIC_LOGIN_ERROR: &str = "ERROR: Incorrect username or password.";

/// 宿主报告用户名已存在时使用的错误码
pub const USERNAME_EXISTS: &str = "username_exists";

/// 当前请求在登录页上执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginAction {
    #[default]
    Login,
    Register,
    /// 找回或重置密码
    PasswordReset,
}

impl LoginAction {
    /// 从请求的 action 参数解析
    pub fn from_action(action: &str) -> Self {
        match action {
            "register" => LoginAction::Register,
            "lostpassword" | "retrievepassword" | "resetpass" | "rp" => LoginAction::PasswordReset,
            _ => LoginAction::Login,
        }
    }

    /// 该页面是否显示登录锁定相关消息
    pub fn shows_login_messages(&self) -> bool {
        matches!(self, LoginAction::Login)
    }
}

/// 单个请求的上下文
#[derive(Debug, Clone)]
pub struct AttemptContext {
    address: String,
    action: LoginAction,
    now: DateTime<Utc>,
    /// 本请求是否已经显示过我们的消息
    pub error_shown: bool,
    /// 本请求的失败是否刚刚触发了锁定
    pub just_locked_out: bool,
    /// 用户名和密码均非空
    pub nonempty_credentials: bool,
}

impl AttemptContext {
    pub fn new(address: impl Into<String>, action: LoginAction, now: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            action,
            now,
            error_shown: false,
            just_locked_out: false,
            nonempty_credentials: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn action(&self) -> LoginAction {
        self.action
    }

    /// 请求开始时的时间快照
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// 宿主报告的表单错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormError {
    pub code: String,
    pub message: String,
}

impl FormError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 登录守卫构建器
pub struct LoginGuardBuilder {
    store: Arc<dyn KeyValueStore>,
    config: LockoutConfig,
    mailer: Option<Arc<dyn Mailer>>,
    clock: Option<Arc<dyn Clock>>,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<LockoutMetrics>>,
}

impl LoginGuardBuilder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            config: LockoutConfig::default(),
            mailer: None,
            clock: None,
            #[cfg(feature = "monitoring")]
            metrics: None,
        }
    }

    /// 设置配置，构建时会先修正
    pub fn config(mut self, config: LockoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[cfg(feature = "monitoring")]
    pub fn metrics(mut self, metrics: Arc<LockoutMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> LoginGuard {
        let config = Arc::new(self.config.sanitized());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ledgers = LedgerStore::new(self.store, config.key_prefix.clone());

        let notifier = Arc::new(Notifier::new(config.clone(), ledgers.clone(), self.mailer));
        let engine = LockoutEngine::new(config.clone(), ledgers.clone(), notifier, clock.clone());
        let registrations =
            RegistrationThrottle::new(config.clone(), ledgers.clone(), clock.clone());

        #[cfg(feature = "monitoring")]
        let (engine, registrations) = match &self.metrics {
            Some(metrics) => (
                engine.with_metrics(metrics.clone()),
                registrations.with_metrics(metrics.clone()),
            ),
            None => (engine, registrations),
        };

        LoginGuard {
            resolver: AddressResolver::new(config.client_type),
            gatekeeper: Gatekeeper::new(config.clone(), ledgers.clone(), clock.clone()),
            admin: LockoutAdmin::new(config.clone(), ledgers, clock.clone()),
            engine,
            registrations,
            config,
            clock,
            #[cfg(feature = "monitoring")]
            metrics: self.metrics,
        }
    }
}

/// 登录守卫
pub struct LoginGuard {
    config: Arc<LockoutConfig>,
    resolver: AddressResolver,
    engine: LockoutEngine,
    registrations: RegistrationThrottle,
    gatekeeper: Gatekeeper,
    admin: LockoutAdmin,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<LockoutMetrics>>,
}

impl std::fmt::Debug for LoginGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGuard")
            .field("resolver", &self.resolver)
            .field("engine", &self.engine)
            .finish()
    }
}

impl LoginGuard {
    pub fn builder(store: Arc<dyn KeyValueStore>) -> LoginGuardBuilder {
        LoginGuardBuilder::new(store)
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn engine(&self) -> &LockoutEngine {
        &self.engine
    }

    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    pub fn registrations(&self) -> &RegistrationThrottle {
        &self.registrations
    }

    pub fn admin(&self) -> &LockoutAdmin {
        &self.admin
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// 开始处理一个请求
    pub fn begin(&self, request: &ClientRequest, action: LoginAction) -> AttemptContext {
        let address = self.resolver.resolve(request);
        if address.is_empty() {
            warn!("Could not resolve client address for {:?}", request);
        }
        AttemptContext::new(address, action, self.clock.now())
    }

    /// 记录凭据是否为空，用于后续过滤错误消息
    pub fn track_credentials(&self, ctx: &mut AttemptContext, username: &str, password: &str) {
        ctx.nonempty_credentials = !username.is_empty() && !password.is_empty();
    }

    /// 认证前检查
    ///
    /// 存储故障时拒绝。
    pub async fn on_authentication_attempt(&self, ctx: &mut AttemptContext) -> AttemptVerdict {
        #[cfg(feature = "monitoring")]
        let started = std::time::Instant::now();

        let verdict = match self.gatekeeper.is_allowed_at(&ctx.address, ctx.now).await {
            Ok(true) => AttemptVerdict::Allow,
            Ok(false) => {
                ctx.error_shown = true;
                let msg = self
                    .gatekeeper
                    .error_message_at(&ctx.address, ctx.now)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Failed to build lockout message: {}", e);
                        lockout_message(LOGIN_LOCKOUT_PREFIX, None, ctx.now)
                    });
                AttemptVerdict::Deny(msg)
            }
            Err(e) => {
                error!("Lockout check failed for {}, denying: {}", ctx.address, e);
                ctx.error_shown = true;
                AttemptVerdict::Deny(lockout_message(LOGIN_LOCKOUT_PREFIX, None, ctx.now))
            }
        };

        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics.record_check(started.elapsed(), verdict.is_allowed());
        }

        verdict
    }

    /// 宿主报告认证失败
    pub async fn on_authentication_failure(
        &self,
        ctx: &mut AttemptContext,
        username: &str,
    ) -> Result<FailureOutcome, LockoutError> {
        let outcome = self
            .engine
            .record_failure_at(&ctx.address, username, ctx.now)
            .await?;
        if outcome.is_lockout() {
            ctx.just_locked_out = true;
        }
        Ok(outcome)
    }

    /// 宿主报告伪造或失效的认证 cookie
    ///
    /// 与认证失败同样计数；宿主随后应清除该请求的认证 cookie。
    pub async fn on_bad_auth_cookie(
        &self,
        ctx: &mut AttemptContext,
        username: &str,
    ) -> Result<FailureOutcome, LockoutError> {
        debug!("Bad auth cookie from {} for '{}'", ctx.address, username);
        self.on_authentication_failure(ctx, username).await
    }

    /// 锁定期间宿主应清除请求携带的认证 cookie
    pub async fn should_clear_auth_cookies(&self, ctx: &AttemptContext) -> bool {
        match self.gatekeeper.is_allowed_at(&ctx.address, ctx.now).await {
            Ok(allowed) => !allowed,
            Err(e) => {
                error!("Lockout check failed for {}: {}", ctx.address, e);
                true
            }
        }
    }

    /// 注册前检查
    pub async fn on_registration_attempt(&self, ctx: &mut AttemptContext) -> AttemptVerdict {
        ctx.error_shown = true;

        match self
            .registrations
            .is_registration_allowed_at(&ctx.address, ctx.now)
            .await
        {
            Ok(true) => AttemptVerdict::Allow,
            Ok(false) => {
                let msg = self
                    .gatekeeper
                    .registration_error_message_at(&ctx.address, ctx.now)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Failed to build registration message: {}", e);
                        lockout_message(REGISTRATION_LOCKOUT_PREFIX, None, ctx.now)
                    });
                AttemptVerdict::Deny(msg)
            }
            Err(e) => {
                error!(
                    "Registration check failed for {}, denying: {}",
                    ctx.address, e
                );
                AttemptVerdict::Deny(lockout_message(REGISTRATION_LOCKOUT_PREFIX, None, ctx.now))
            }
        }
    }

    /// 宿主报告注册成功
    pub async fn on_registration_success(&self, ctx: &AttemptContext) -> Result<(), LockoutError> {
        self.registrations
            .add_registration_at(&ctx.address, ctx.now)
            .await?;
        Ok(())
    }

    /// 登录页上要追加的消息
    ///
    /// 注册页上且已达注册上限时返回注册限制提示；登录页上每个请求最多返回
    /// 一次当前消息。
    pub async fn login_message(&self, ctx: &mut AttemptContext) -> Option<String> {
        if ctx.action == LoginAction::Register && !ctx.error_shown {
            let blocked = match self
                .registrations
                .is_registration_allowed_at(&ctx.address, ctx.now)
                .await
            {
                Ok(allowed) => !allowed,
                Err(e) => {
                    warn!("Registration check failed for {}: {}", ctx.address, e);
                    false
                }
            };
            if blocked {
                return self
                    .gatekeeper
                    .registration_error_message_at(&ctx.address, ctx.now)
                    .await
                    .ok();
            }
        }

        if !ctx.action.shows_login_messages() || ctx.error_shown {
            return None;
        }

        match self.gatekeeper.current_message(&ctx.address).await {
            Ok(Some(msg)) => {
                ctx.error_shown = true;
                Some(msg)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to build login message for {}: {}", ctx.address, e);
                None
            }
        }
    }

    /// 过滤宿主的登录错误消息
    ///
    /// 锁定期间（且不是本请求触发的锁定）只显示锁定提示；凭据非空时把宿主
    /// 的错误替换为通用提示，避免泄露用户名是否存在。
    pub async fn filter_login_errors(
        &self,
        ctx: &AttemptContext,
        mut errors: Vec<String>,
    ) -> Vec<String> {
        if !ctx.action.shows_login_messages() {
            return errors;
        }

        let locked = match self.gatekeeper.is_allowed_at(&ctx.address, ctx.now).await {
            Ok(allowed) => !allowed,
            Err(e) => {
                error!("Lockout check failed for {}: {}", ctx.address, e);
                true
            }
        };
        if locked && !ctx.just_locked_out {
            let msg = self
                .gatekeeper
                .error_message_at(&ctx.address, ctx.now)
                .await
                .unwrap_or_else(|_| lockout_message(LOGIN_LOCKOUT_PREFIX, None, ctx.now));
            return vec![msg];
        }

        while errors.last().is_some_and(|e| e.is_empty()) {
            errors.pop();
        }

        let own_messages = usize::from(ctx.error_shown);
        if ctx.nonempty_credentials && errors.len() > own_messages {
            let mut replaced = vec![GENERIC_LOGIN_ERROR.to_string()];
            if ctx.error_shown {
                match self.gatekeeper.current_message(&ctx.address).await {
                    Ok(Some(msg)) => replaced.push(msg),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to build login message for {}: {}", ctx.address, e),
                }
            }
            return replaced;
        }

        errors
    }

    /// 过滤宿主的注册错误
    ///
    /// 同时报告多个错误时去掉“用户名已存在”，防止借助无效邮箱枚举用户名。
    pub fn filter_registration_errors(&self, errors: Vec<FormError>) -> Vec<FormError> {
        if errors.len() <= 1 {
            return errors;
        }
        errors
            .into_iter()
            .filter(|e| e.code != USERNAME_EXISTS)
            .collect()
    }
}
