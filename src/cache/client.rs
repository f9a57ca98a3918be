//! 缓存客户端 — 三种读穿策略
//!
//! | 策略 | 防击穿手段 | 适用 |
//! |------|-----------|------|
//! | `query_pass_through` | 无 (仅空值负缓存防穿透) | 低竞争键 |
//! | `query_with_mutex` | 键级锁 + 有界等待重试 | 一致性优先 |
//! | `query_with_logical_expire` | 信封过期 + 后台重建池 | 最热读路径，读者零阻塞 |
//!
//! 策略的选择是按实体类型的配置决定，不在方法内部做运行时分支。
//! 三种策略共用同一把分布式锁原语。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::entry::CacheEntry;
use super::rebuild::RebuildPool;
use crate::db::{RepoError, RepoResult};
use crate::kv::{KvError, KvStore};
use crate::lock::DistributedLock;
use crate::utils::now_millis;

/// 缓存层错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache kv error: {0}")]
    Kv(#[from] KvError),

    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cache source error: {0}")]
    Source(#[from] RepoError),

    /// 互斥重建等待超出调用方时限
    #[error("cache rebuild wait timed out on key: {0}")]
    RebuildTimeout(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// 缓存客户端配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 空值负缓存 TTL
    pub null_ttl: Duration,
    /// 重建锁租约时长
    pub lock_ttl: Duration,
    /// 互斥策略等待重试间隔
    pub retry_interval: Duration,
    /// 互斥策略总等待上限 (防无界自旋)
    pub wait_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            null_ttl: Duration::from_secs(120),
            lock_ttl: Duration::from_secs(10),
            retry_interval: Duration::from_millis(50),
            wait_timeout: Duration::from_secs(2),
        }
    }
}

/// 普通缓存读取结果 (区分负缓存命中与未命中)
enum Plain<T> {
    Hit(T),
    /// 空字符串哨兵 — 源中确认不存在
    NegativeHit,
    Miss,
}

/// 读穿缓存客户端
#[derive(Clone)]
pub struct CacheClient {
    kv: Arc<dyn KvStore>,
    lock: DistributedLock,
    rebuild: RebuildPool,
    config: CacheConfig,
}

impl CacheClient {
    pub fn new(
        kv: Arc<dyn KvStore>,
        lock: DistributedLock,
        rebuild: RebuildPool,
        config: CacheConfig,
    ) -> Self {
        Self {
            kv,
            lock,
            rebuild,
            config,
        }
    }

    /// 带存储 TTL 写入
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()> {
        self.kv
            .set_ex(key, &serde_json::to_string(value)?, ttl)
            .await?;
        Ok(())
    }

    /// 带逻辑过期时间写入 — 无存储 TTL，键只因内存压力被逐出
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let entry = CacheEntry::new(value, now_millis() + ttl.as_millis() as i64);
        self.kv.set(key, &serde_json::to_string(&entry)?).await?;
        Ok(())
    }

    /// 源更新后删除缓存 (cache-aside 写路径)
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.kv.del(key).await?;
        Ok(())
    }

    async fn read_plain<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Plain<T>> {
        match self.kv.get(key).await? {
            None => Ok(Plain::Miss),
            Some(raw) if raw.is_empty() => Ok(Plain::NegativeHit),
            Some(raw) => Ok(Plain::Hit(serde_json::from_str(&raw)?)),
        }
    }

    /// 回源结果写回缓存：命中写实体 JSON，未命中写空值哨兵
    async fn write_back<T: Serialize>(
        &self,
        key: &str,
        fetched: &Option<T>,
        ttl: Duration,
    ) -> CacheResult<()> {
        match fetched {
            Some(value) => self.set(key, value, ttl).await,
            None => {
                self.kv.set_ex(key, "", self.config.null_ttl).await?;
                Ok(())
            }
        }
    }

    async fn release_quiet(&self, key: &str, token: &crate::lock::LockToken) {
        match self.lock.release(key, token).await {
            Ok(true) => {}
            // 租约已过期属正常情形
            Ok(false) => tracing::debug!(key, "cache lock already released or expired"),
            Err(e) => tracing::error!(key, error = %e, "cache lock release failed"),
        }
    }

    /// 直通策略：miss 即回源，空结果写负缓存
    ///
    /// 无击穿防护，只适合低竞争键。
    pub async fn query_pass_through<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fallback: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepoResult<Option<T>>>,
    {
        match self.read_plain(key).await? {
            Plain::Hit(value) => Ok(Some(value)),
            Plain::NegativeHit => Ok(None),
            Plain::Miss => {
                let fetched = fallback().await?;
                self.write_back(key, &fetched, ttl).await?;
                Ok(fetched)
            }
        }
    }

    /// 互斥重建策略：miss 时竞争键级锁，胜者回源，败者等待重读
    ///
    /// 等待由总时限约束，而不是重试次数。
    pub async fn query_with_mutex<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fallback: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepoResult<Option<T>>>,
    {
        let deadline = Instant::now() + self.config.wait_timeout;

        let token = loop {
            match self.read_plain(key).await? {
                Plain::Hit(value) => return Ok(Some(value)),
                Plain::NegativeHit => return Ok(None),
                Plain::Miss => {}
            }

            if let Some(token) = self.lock.try_acquire(key, self.config.lock_ttl).await? {
                // 双检：等锁期间别人可能已完成重建
                match self.read_plain(key).await {
                    Ok(Plain::Miss) => break token,
                    Ok(Plain::Hit(value)) => {
                        self.release_quiet(key, &token).await;
                        return Ok(Some(value));
                    }
                    Ok(Plain::NegativeHit) => {
                        self.release_quiet(key, &token).await;
                        return Ok(None);
                    }
                    Err(e) => {
                        self.release_quiet(key, &token).await;
                        return Err(e);
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(CacheError::RebuildTimeout(key.to_string()));
            }
            tokio::time::sleep(self.config.retry_interval).await;
        };

        // 持锁回源；无论成败都释放锁
        let outcome: CacheResult<Option<T>> = async {
            let fetched = fallback().await?;
            self.write_back(key, &fetched, ttl).await?;
            Ok(fetched)
        }
        .await;
        self.release_quiet(key, &token).await;
        outcome
    }

    /// 逻辑过期策略：过期值立即返回，重建转入后台池
    ///
    /// 读者路径上没有任何等待：未命中视为非热键直接返回 None，
    /// 命中过期值时最多多一次锁尝试与一次 `try_send`。
    pub async fn query_with_logical_expire<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fallback: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = RepoResult<Option<T>>> + Send,
    {
        let raw = match self.kv.get(key).await? {
            Some(raw) => raw,
            // 逻辑过期键由预热写入 — 未命中说明不是热键
            None => return Ok(None),
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let entry: CacheEntry<T> = serde_json::from_str(&raw)?;
        if !entry.is_expired(now_millis()) {
            return Ok(Some(entry.data));
        }

        // 已过期：拿到锁才提交重建，拿不到说明重建已在途
        if let Some(token) = self.lock.try_acquire(key, self.config.lock_ttl).await? {
            let client = self.clone();
            let job_key = key.to_string();
            let job_token = token.clone();
            let job = async move {
                match fallback().await {
                    Ok(Some(value)) => {
                        if let Err(e) = client
                            .set_with_logical_expire(&job_key, &value, ttl)
                            .await
                        {
                            tracing::error!(key = %job_key, error = %e, "cache rebuild write failed");
                        }
                    }
                    Ok(None) => {
                        // 源行已删除 — 写负缓存收敛后续读
                        if let Err(e) = client.kv.set_ex(&job_key, "", client.config.null_ttl).await
                        {
                            tracing::error!(key = %job_key, error = %e, "cache tombstone write failed");
                        }
                    }
                    Err(e) => {
                        tracing::error!(key = %job_key, error = %e, "cache rebuild source query failed");
                    }
                }
                client.release_quiet(&job_key, &job_token).await;
            };

            if !self.rebuild.try_submit(job) {
                // 池满 — 放弃本次重建，旧值继续服务
                tracing::warn!(key, "cache rebuild pool full, serving stale value");
                self.release_quiet(key, &token).await;
            }
        }

        // 旧值立即返回，绝不让读者等待重建
        Ok(Some(entry.data))
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
