//! 分布式互斥锁 (租约式)
//!
//! `try_acquire` 是一次条件写入 (set-if-absent-with-TTL)，不阻塞不重试，
//! 重试策略由调用方决定。`release` 走原子的 delete-if-match，
//! 确保锁只能被持有令牌的一方释放；持有者崩溃时由 TTL 兜底。
//!
//! 两个使用方：
//! - 持久化 worker 按 userId 串行落库
//! - 缓存客户端按实体键串行重建

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::kv::{keys, KvResult, KvStore};

/// 锁租约凭据 — 释放时必须出示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 租约式分布式锁
#[derive(Clone)]
pub struct DistributedLock {
    kv: Arc<dyn KvStore>,
}

impl DistributedLock {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// 单次尝试获取 `name` 上的锁
    ///
    /// 成功返回本次租约的令牌，失败返回 `None` — 失败是正常控制流，
    /// 不是错误。
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> KvResult<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self
            .kv
            .set_nx_ex(&keys::lock_key(name), token.as_str(), ttl)
            .await?;
        Ok(acquired.then_some(token))
    }

    /// 释放 `name` 上的锁
    ///
    /// 令牌不符或租约已过期时是 no-op，返回 `false`。
    pub async fn release(&self, name: &str, token: &LockToken) -> KvResult<bool> {
        self.kv
            .del_if_match(&keys::lock_key(name), token.as_str())
            .await
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let lock = lock();
        let ttl = Duration::from_secs(10);

        let token = lock.try_acquire("order:1", ttl).await.unwrap();
        assert!(token.is_some());
        assert!(lock.try_acquire("order:1", ttl).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_is_noop() {
        let lock = lock();
        let ttl = Duration::from_secs(10);

        let holder = lock.try_acquire("order:2", ttl).await.unwrap().unwrap();
        let intruder = LockToken::generate();

        assert!(!lock.release("order:2", &intruder).await.unwrap());
        // 锁仍被持有
        assert!(lock.try_acquire("order:2", ttl).await.unwrap().is_none());

        assert!(lock.release("order:2", &holder).await.unwrap());
        assert!(lock.try_acquire("order:2", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_is_implicitly_free() {
        let lock = lock();

        let stale = lock
            .try_acquire("order:3", Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // 租约过期后其他方可获取
        assert!(lock
            .try_acquire("order:3", Duration::from_secs(10))
            .await
            .unwrap()
            .is_some());
        // 旧令牌的释放不会误删新持有者的锁
        assert!(!lock.release("order:3", &stale).await.unwrap());
        assert!(lock
            .try_acquire("order:3", Duration::from_secs(10))
            .await
            .unwrap()
            .is_none());
    }
}
