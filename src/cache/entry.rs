//! 逻辑过期信封
//!
//! 逻辑过期策略不依赖存储 TTL：过期时间随载荷一起序列化，
//! 键本身只会因内存压力被逐出。

use serde::{Deserialize, Serialize};

/// 带逻辑过期时间的缓存载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// 逻辑过期时刻 (Unix millis)
    pub expire_at: i64,
    pub data: T,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, expire_at: i64) -> Self {
        Self { expire_at, data }
    }

    /// 是否已逻辑过期 — 过期的条目仍可读，只是触发后台重建
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expire_at <= now_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new("x", 1_000);
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));
        assert!(entry.is_expired(1_001));
    }
}
