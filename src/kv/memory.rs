//! Memory KV 实现 (单进程)
//!
//! 一把互斥锁串行所有操作，给出与 Redis 脚本执行相同的线性化语义。
//! 用于测试和单进程嵌入部署。

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{keys, AdmissionCode, KvError, KvResult, KvStore};

/// 条目值：字符串或集合
#[derive(Debug, Clone)]
enum MemValue {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct MemEntry {
    value: MemValue,
    /// None 表示永不过期
    expires_at: Option<Instant>,
}

impl MemEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 进程内 KV 存储
///
/// 所有操作在同一把锁内完成，准入这类多步操作天然原子。
/// 过期键在访问时惰性清除。
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, MemEntry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// 锁内读取未过期条目；过期条目顺手删除
    fn live_value<'a>(
        map: &'a mut HashMap<String, MemEntry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut MemEntry> {
        if map.get(key).is_some_and(|e| e.is_expired(now)) {
            map.remove(key);
        }
        map.get_mut(key)
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut map = self.inner.lock();
        match Self::live_value(&mut map, key, Instant::now()) {
            Some(entry) => match &entry.value {
                MemValue::Str(s) => Ok(Some(s.clone())),
                MemValue::Set(_) => Err(KvError::Value(format!(
                    "GET on set-valued key: {key}"
                ))),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.inner.lock().insert(
            key.to_string(),
            MemEntry {
                value: MemValue::Str(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        self.inner.lock().insert(
            key.to_string(),
            MemEntry {
                value: MemValue::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut map = self.inner.lock();
        let now = Instant::now();
        match Self::live_value(&mut map, key, now) {
            Some(entry) => match &mut entry.value {
                MemValue::Str(s) => {
                    let n: i64 = s
                        .parse()
                        .map_err(|_| KvError::Value(format!("INCR on non-integer key: {key}")))?;
                    let next = n + 1;
                    *s = next.to_string();
                    Ok(next)
                }
                MemValue::Set(_) => Err(KvError::Value(format!(
                    "INCR on set-valued key: {key}"
                ))),
            },
            None => {
                map.insert(
                    key.to_string(),
                    MemEntry {
                        value: MemValue::Str("1".to_string()),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<bool> {
        let mut map = self.inner.lock();
        let now = Instant::now();
        if Self::live_value(&mut map, key, now).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            MemEntry {
                value: MemValue::Str(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn del_if_match(&self, key: &str, expected: &str) -> KvResult<bool> {
        let mut map = self.inner.lock();
        let matches = matches!(
            Self::live_value(&mut map, key, Instant::now()),
            Some(MemEntry { value: MemValue::Str(s), .. }) if s.as_str() == expected
        );
        if matches {
            map.remove(key);
        }
        Ok(matches)
    }

    async fn seckill_admit(&self, voucher_id: i64, user_id: i64) -> KvResult<AdmissionCode> {
        // 整段在一把锁内 — 与 Lua 脚本等价的原子临界区
        let mut map = self.inner.lock();
        let now = Instant::now();

        let stock_key = keys::stock_key(voucher_id);
        let stock = match Self::live_value(&mut map, &stock_key, now) {
            Some(MemEntry { value: MemValue::Str(s), .. }) => s
                .parse::<i64>()
                .map_err(|_| KvError::Value(format!("non-integer stock: {stock_key}")))?,
            _ => return Ok(AdmissionCode::StockExhausted),
        };
        if stock <= 0 {
            return Ok(AdmissionCode::StockExhausted);
        }

        let order_key = keys::order_set_key(voucher_id);
        let member = user_id.to_string();
        if let Some(MemEntry { value: MemValue::Set(users), .. }) =
            Self::live_value(&mut map, &order_key, now)
            && users.contains(&member)
        {
            return Ok(AdmissionCode::DuplicateOrder);
        }

        // 扣减库存
        if let Some(MemEntry { value: MemValue::Str(s), .. }) =
            Self::live_value(&mut map, &stock_key, now)
        {
            *s = (stock - 1).to_string();
        }
        // 写入用户标记
        match Self::live_value(&mut map, &order_key, now) {
            Some(MemEntry { value: MemValue::Set(users), .. }) => {
                users.insert(member);
            }
            _ => {
                map.insert(
                    order_key,
                    MemEntry {
                        value: MemValue::Set(HashSet::from([member])),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(AdmissionCode::Admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_decrements_until_exhausted() {
        let kv = MemoryKv::new();
        kv.set(&keys::stock_key(1), "2").await.unwrap();

        assert_eq!(
            kv.seckill_admit(1, 100).await.unwrap(),
            AdmissionCode::Admitted
        );
        assert_eq!(
            kv.seckill_admit(1, 101).await.unwrap(),
            AdmissionCode::Admitted
        );
        assert_eq!(
            kv.seckill_admit(1, 102).await.unwrap(),
            AdmissionCode::StockExhausted
        );
        // 库存停在 0，不会为负
        assert_eq!(kv.get(&keys::stock_key(1)).await.unwrap().unwrap(), "0");
    }

    #[tokio::test]
    async fn test_admit_rejects_duplicate_user() {
        let kv = MemoryKv::new();
        kv.set(&keys::stock_key(7), "5").await.unwrap();

        assert_eq!(
            kv.seckill_admit(7, 42).await.unwrap(),
            AdmissionCode::Admitted
        );
        assert_eq!(
            kv.seckill_admit(7, 42).await.unwrap(),
            AdmissionCode::DuplicateOrder
        );
        // 重复请求不扣库存
        assert_eq!(kv.get(&keys::stock_key(7)).await.unwrap().unwrap(), "4");
    }

    #[tokio::test]
    async fn test_admit_missing_stock_is_exhausted() {
        let kv = MemoryKv::new();
        assert_eq!(
            kv.seckill_admit(99, 1).await.unwrap(),
            AdmissionCode::StockExhausted
        );
    }

    #[tokio::test]
    async fn test_incr_starts_from_zero() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("icr:test:2026:01:01").await.unwrap(), 1);
        assert_eq!(kv.incr("icr:test:2026:01:01").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_nx_ex_respects_existing_and_expiry() {
        let kv = MemoryKv::new();
        let ttl = Duration::from_millis(40);

        assert!(kv.set_nx_ex("lock:a", "t1", ttl).await.unwrap());
        assert!(!kv.set_nx_ex("lock:a", "t2", ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        // 租约到期后键视为不存在
        assert!(kv.set_nx_ex("lock:a", "t3", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_del_if_match_only_removes_matching_value() {
        let kv = MemoryKv::new();
        kv.set("lock:b", "owner-1").await.unwrap();

        assert!(!kv.del_if_match("lock:b", "owner-2").await.unwrap());
        assert_eq!(kv.get("lock:b").await.unwrap().unwrap(), "owner-1");

        assert!(kv.del_if_match("lock:b", "owner-1").await.unwrap());
        assert_eq!(kv.get("lock:b").await.unwrap(), None);
    }
}
