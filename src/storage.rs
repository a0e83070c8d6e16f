//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 存储抽象层
//!
//! 定义宿主应用提供的键值持久化接口和内存实现。每个账本以一个完整的
//! 字符串值保存在一个键下，读取、修改后整体写回。

use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;

/// 键值存储接口
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 获取值
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 设置值
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// 删除值
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// 比较并交换
    ///
    /// 当前值等于 `expected`（`None` 表示键不存在）时写入 `value` 并返回
    /// `true`，否则不写入并返回 `false`。
    ///
    /// 默认实现不是原子的；支持原子更新的后端应当覆盖它。
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StorageError> {
        let current = self.get(key).await?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.set(key, value).await?;
        Ok(true)
    }
}

/// 内存存储实现
///
/// 单进程内共享；比较并交换在 DashMap 的单键锁内完成，是原子的。
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: dashmap::DashMap<String, String>,
}

impl MemoryStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self {
            data: dashmap::DashMap::new(),
        }
    }

    /// 键数量
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 清空所有键
    pub fn clear(&self) {
        self.data.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StorageError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if expected == Some(entry.get().as_str()) {
                    entry.insert(value.to_string());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                if expected.is_none() {
                    entry.insert(value.to_string());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// 始终不可用的存储
///
/// 用于验证持久化故障时的失败关闭行为。
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::ConnectionError(format!("存储不可用: {}", key)))
    }

    async fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::ConnectionError(format!("存储不可用: {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        Err(StorageError::ConnectionError(format!("存储不可用: {}", key)))
    }
}
