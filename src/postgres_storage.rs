//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! PostgreSQL存储实现
//!
//! 使用sqlx连接池，把每个账本保存为一行。
//!
//! # 数据库Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS loginward_ledgers (
//!     key VARCHAR(255) PRIMARY KEY,
//!     value TEXT NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use crate::error::StorageError;
use crate::storage::KeyValueStore;
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error, info};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS loginward_ledgers (
    key VARCHAR(255) PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// PostgreSQL存储配置
#[derive(Clone)]
pub struct PostgresStoreConfig {
    /// 数据库连接URL（使用 Secret 包装以防止意外泄露）
    pub database_url: Secret<String>,
    /// 连接池最大连接数
    pub max_connections: u32,
    /// 连接池最小空闲连接数
    pub min_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
}

impl std::fmt::Debug for PostgresStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStoreConfig")
            .field("database_url", &"***")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            database_url: Secret::new(String::new()),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
        }
    }
}

impl PostgresStoreConfig {
    /// 创建新的配置
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: Secret::new(database_url.into()),
            ..Default::default()
        }
    }

    /// 设置最大连接数
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// 设置最小连接数
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// 设置连接超时
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.as_secs();
        self
    }
}

/// PostgreSQL存储
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresStore {
    /// 连接数据库并确保账本表存在
    pub async fn new(config: PostgresStoreConfig) -> Result<Self, StorageError> {
        info!("正在连接PostgreSQL数据库...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(config.database_url.expose_secret())
            .await
            .map_err(|e| {
                error!("数据库连接失败: {}", e);
                StorageError::ConnectionError(format!("无法连接到数据库: {}", e))
            })?;

        let store = Self { pool };
        store.migrate().await?;
        info!("成功连接到PostgreSQL数据库");
        Ok(store)
    }

    /// 从已有连接池创建
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 创建账本表
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(format!("创建账本表失败: {}", e)))?;
        Ok(())
    }

    /// 检查数据库连接
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(format!("Ping失败: {}", e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM loginward_ledgers WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        debug!("设置键: {}", key);
        sqlx::query(
            r#"
            INSERT INTO loginward_ledgers (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        debug!("删除键: {}", key);
        sqlx::query("DELETE FROM loginward_ledgers WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 条件更新；键不存在时用 `ON CONFLICT DO NOTHING` 插入
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StorageError> {
        let result = match expected {
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE loginward_ledgers
                    SET value = $3,
                        updated_at = now()
                    WHERE key = $1 AND value = $2
                    "#,
                )
                .bind(key)
                .bind(expected)
                .bind(value)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO loginward_ledgers (key, value, updated_at)
                    VALUES ($1, $2, now())
                    ON CONFLICT (key) DO NOTHING
                    "#,
                )
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }
}
