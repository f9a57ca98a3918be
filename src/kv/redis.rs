//! Redis KV 实现 (多进程生产部署)
//!
//! 基于 `redis` crate 的 `ConnectionManager` (断线自动重连)。
//! 准入与锁释放两个多步操作以 Lua 脚本在服务端原子执行，
//! 脚本源文件随 crate 一起发布 (`scripts/`)。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{keys, AdmissionCode, KvResult, KvStore};

/// 准入脚本 — 库存校验 + 重复校验 + 扣减，单次服务端执行
const ADMIT_SCRIPT: &str = include_str!("scripts/seckill_admit.lua");

/// 锁释放脚本 — 读取、比较、删除一步完成
const UNLOCK_SCRIPT: &str = include_str!("scripts/unlock.lua");

/// Redis 后端
///
/// `ConnectionManager` 可廉价克隆，内部复用同一条多路复用连接。
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
    admit_script: Arc<Script>,
    unlock_script: Arc<Script>,
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv").finish_non_exhaustive()
    }
}

impl RedisKv {
    /// 连接 Redis，如 `redis://127.0.0.1:6379`
    pub async fn connect(url: &str) -> KvResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url, "Redis connection established");
        Ok(Self {
            conn,
            admit_script: Arc::new(Script::new(ADMIT_SCRIPT)),
            unlock_script: Arc::new(Script::new(UNLOCK_SCRIPT)),
        })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut conn = self.conn.clone();
        let n: i64 = conn.incr(key, 1).await?;
        Ok(n)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX PX — 成功返回 OK，已存在返回 nil
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del_if_match(&self, key: &str, expected: &str) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .unlock_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn seckill_admit(&self, voucher_id: i64, user_id: i64) -> KvResult<AdmissionCode> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .admit_script
            .key(keys::stock_key(voucher_id))
            .key(keys::order_set_key(voucher_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;
        AdmissionCode::from_wire(code)
    }
}
