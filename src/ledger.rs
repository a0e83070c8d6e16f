//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 账本模块
//!
//! 每个账本是一个按客户端地址索引的映射，整体序列化为一个 JSON 值，
//! 保存在 `<key_prefix><账本名>` 键下。读取时整体加载，修改后整体写回。

use crate::constants::MAX_UPDATE_ATTEMPTS;
use crate::error::LockoutError;
use crate::storage::KeyValueStore;
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// 地址到到期时间的映射（锁定、有效期）
pub type TimeLedger = HashMap<String, DateTime<Utc>>;

/// 地址到计数的映射（失败次数、注册次数）
pub type CountLedger = HashMap<String, u32>;

/// 地址到（用户名到锁定次数）的映射
pub type LogLedger = HashMap<String, HashMap<String, u64>>;

/// 账本名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerName {
    Lockouts,
    Retries,
    RetriesValid,
    Registrations,
    RegistrationsValid,
    Logged,
    LockoutsTotal,
    RegLockoutsTotal,
}

impl LedgerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerName::Lockouts => "lockouts",
            LedgerName::Retries => "retries",
            LedgerName::RetriesValid => "retries_valid",
            LedgerName::Registrations => "registrations",
            LedgerName::RegistrationsValid => "registrations_valid",
            LedgerName::Logged => "logged",
            LedgerName::LockoutsTotal => "lockouts_total",
            LedgerName::RegLockoutsTotal => "reg_lockouts_total",
        }
    }
}

impl std::fmt::Display for LedgerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 账本存取
///
/// 在 [`KeyValueStore`] 之上负责键名拼接和 JSON 编解码。
#[derive(Clone)]
pub struct LedgerStore {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl LedgerStore {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// 账本在存储中的键
    pub fn key(&self, name: LedgerName) -> String {
        format!("{}{}", self.prefix, name.as_str())
    }

    /// 底层存储
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// 加载账本，不存在时返回空账本
    pub async fn load<T>(&self, name: LedgerName) -> Result<T, LockoutError>
    where
        T: DeserializeOwned + Default,
    {
        let raw = self.store.get(&self.key(name)).await?;
        Ok(decode(name, raw.as_deref()))
    }

    /// 整体写回账本
    pub async fn save<T>(&self, name: LedgerName, value: &T) -> Result<(), LockoutError>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.store.set(&self.key(name), &raw).await?;
        debug!("Saved ledger {}", name);
        Ok(())
    }

    /// 用空值覆盖账本
    pub async fn reset<T>(&self, name: LedgerName) -> Result<(), LockoutError>
    where
        T: Serialize + Default + Sync,
    {
        self.save(name, &T::default()).await
    }

    /// 乐观更新单个账本
    ///
    /// 读取、修改后以比较并交换写回；冲突时重读重试，最多
    /// [`MAX_UPDATE_ATTEMPTS`] 次，之后退化为直接写入。
    pub async fn update<T, F>(&self, name: LedgerName, mut mutate: F) -> Result<T, LockoutError>
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync,
        F: FnMut(&mut T) + Send,
    {
        let key = self.key(name);

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let raw = self.store.get(&key).await?;
            let mut value: T = decode(name, raw.as_deref());
            mutate(&mut value);
            let encoded = serde_json::to_string(&value)?;

            if self
                .store
                .compare_and_swap(&key, raw.as_deref(), &encoded)
                .await?
            {
                return Ok(value);
            }
            debug!("Ledger {} changed concurrently, attempt {}", name, attempt);
        }

        warn!(
            "Ledger {} still contended after {} attempts, writing without check",
            name, MAX_UPDATE_ATTEMPTS
        );
        let mut value: T = self.load(name).await?;
        mutate(&mut value);
        self.save(name, &value).await?;
        Ok(value)
    }

    /// 读取计数总量
    pub async fn load_total(&self, name: LedgerName) -> Result<u64, LockoutError> {
        self.load::<u64>(name).await
    }

    /// 计数总量加一，返回新值
    pub async fn increment_total(&self, name: LedgerName) -> Result<u64, LockoutError> {
        self.update::<u64, _>(name, |total| *total = total.saturating_add(1))
            .await
    }
}

/// 解码账本，损坏的值按空账本处理
fn decode<T>(name: LedgerName, raw: Option<&str>) -> T
where
    T: DeserializeOwned + Default,
{
    match raw {
        None => T::default(),
        Some(raw) => match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ledger {} is corrupt, treating as empty: {}", name, e);
                T::default()
            }
        },
    }
}

/// 一次操作涉及的计数账本工作集
///
/// 加载锁定、失败计数和注册三组账本，记录哪些被修改过，
/// 持久化时只写回修改过的账本。
#[derive(Debug, Clone, Default)]
pub struct LedgerSet {
    pub lockouts: TimeLedger,
    pub retries: CountLedger,
    pub retries_valid: TimeLedger,
    pub registrations: CountLedger,
    pub registrations_valid: TimeLedger,
    dirty: Vec<LedgerName>,
}

impl LedgerSet {
    /// 从存储加载全部计数账本
    pub async fn load(ledgers: &LedgerStore) -> Result<Self, LockoutError> {
        Ok(Self {
            lockouts: ledgers.load(LedgerName::Lockouts).await?,
            retries: ledgers.load(LedgerName::Retries).await?,
            retries_valid: ledgers.load(LedgerName::RetriesValid).await?,
            registrations: ledgers.load(LedgerName::Registrations).await?,
            registrations_valid: ledgers.load(LedgerName::RegistrationsValid).await?,
            dirty: Vec::new(),
        })
    }

    /// 标记账本已修改
    pub fn mark_dirty(&mut self, name: LedgerName) {
        if !self.dirty.contains(&name) {
            self.dirty.push(name);
        }
    }

    pub fn is_dirty(&self, name: LedgerName) -> bool {
        self.dirty.contains(&name)
    }

    /// 写回修改过的账本
    ///
    /// 按 [`PERSIST_ORDER`] 写入，锁定账本总在计数账本之前落盘；中途失败时
    /// 尚未写入的账本保持为已修改。
    pub async fn persist(&mut self, ledgers: &LedgerStore) -> Result<(), LockoutError> {
        for name in PERSIST_ORDER {
            if !self.is_dirty(name) {
                continue;
            }
            match name {
                LedgerName::Lockouts => ledgers.save(name, &self.lockouts).await?,
                LedgerName::Retries => ledgers.save(name, &self.retries).await?,
                LedgerName::RetriesValid => ledgers.save(name, &self.retries_valid).await?,
                LedgerName::Registrations => ledgers.save(name, &self.registrations).await?,
                LedgerName::RegistrationsValid => {
                    ledgers.save(name, &self.registrations_valid).await?
                }
                _ => {}
            }
            self.dirty.retain(|dirty| *dirty != name);
        }

        for other in self.dirty.drain(..) {
            warn!("Ledger {} is not part of the working set", other);
        }
        Ok(())
    }
}

/// 工作集账本的写入顺序
const PERSIST_ORDER: [LedgerName; 5] = [
    LedgerName::Lockouts,
    LedgerName::Retries,
    LedgerName::RetriesValid,
    LedgerName::Registrations,
    LedgerName::RegistrationsValid,
];
