//! 共享 KV 存储抽象
//!
//! 秒杀核心消费的键值存储接口：字符串读写、原子自增、
//! 条件写入 (set-if-absent-with-TTL)、条件删除 (delete-if-match)，
//! 以及秒杀准入这一条原子多步操作。
//!
//! # 实现
//!
//! | 实现 | 场景 | 原子性来源 |
//! |------|------|-----------|
//! | [`RedisKv`] | 多进程生产部署 | 服务端 Lua 脚本串行执行 |
//! | [`MemoryKv`] | 测试 / 单进程嵌入 | 单把互斥锁串行所有操作 |
//!
//! 两个实现对同一组操作给出相同的线性化语义，上层组件
//! (准入评估器、分布式锁、ID 生成器、缓存客户端) 只依赖 trait。

pub mod memory;
pub mod redis;

pub use memory::MemoryKv;
pub use redis::RedisKv;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// KV 层错误
#[derive(Debug, Error)]
pub enum KvError {
    /// 后端不可达或命令失败
    #[error("kv backend error: {0}")]
    Backend(String),

    /// 存储内容与预期类型不符 (如对非整数 INCR)
    #[error("kv value error: {0}")]
    Value(String),
}

impl From<::redis::RedisError> for KvError {
    fn from(err: ::redis::RedisError) -> Self {
        KvError::Backend(err.to_string())
    }
}

pub type KvResult<T> = Result<T, KvError>;

/// 准入评估结果码 — 与脚本的整数返回值一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionCode {
    /// 0: 库存扣减成功，用户标记已写入
    Admitted,
    /// 1: 库存不存在或已为 0
    StockExhausted,
    /// 2: 该用户已持有此券的标记
    DuplicateOrder,
}

impl AdmissionCode {
    /// 从脚本整数返回值解析
    pub fn from_wire(code: i64) -> KvResult<Self> {
        match code {
            0 => Ok(AdmissionCode::Admitted),
            1 => Ok(AdmissionCode::StockExhausted),
            2 => Ok(AdmissionCode::DuplicateOrder),
            other => Err(KvError::Value(format!(
                "unexpected admission code: {other}"
            ))),
        }
    }
}

/// 共享 KV 存储接口
///
/// 所有方法都是单次往返；多步操作 (准入、条件删除) 在后端内部
/// 原子执行，调用方之间不可见中间状态。
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> KvResult<()>;

    /// 带过期时间写入
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    async fn del(&self, key: &str) -> KvResult<()>;

    /// 原子自增，键不存在时从 0 起
    async fn incr(&self, key: &str) -> KvResult<i64>;

    /// 键不存在时才写入并设置 TTL；返回是否写入成功。
    /// 锁租约的获取原语。
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<bool>;

    /// 当前值等于 `expected` 时删除；读取、比较、删除为一步原子操作。
    /// 返回是否删除。锁租约的释放原语。
    async fn del_if_match(&self, key: &str, expected: &str) -> KvResult<bool>;

    /// 秒杀准入：校验库存与用户重复标记并扣减一个单位，整体原子。
    ///
    /// 1. 库存键缺失或 ≤0 → [`AdmissionCode::StockExhausted`]
    /// 2. (voucher, user) 标记已存在 → [`AdmissionCode::DuplicateOrder`]
    /// 3. 否则库存减一、写入标记 → [`AdmissionCode::Admitted`]
    async fn seckill_admit(&self, voucher_id: i64, user_id: i64) -> KvResult<AdmissionCode>;
}

/// 键名约定 — 与原子脚本共享，集中在一处维护
pub mod keys {
    /// 券的缓存库存计数器
    pub fn stock_key(voucher_id: i64) -> String {
        format!("seckill:stock:{voucher_id}")
    }

    /// 券的已下单用户集合
    pub fn order_set_key(voucher_id: i64) -> String {
        format!("seckill:order:{voucher_id}")
    }

    /// 券的售卖窗口缓存
    pub fn voucher_key(voucher_id: i64) -> String {
        format!("seckill:voucher:{voucher_id}")
    }

    /// 锁租约键
    pub fn lock_key(name: &str) -> String {
        format!("lock:{name}")
    }

    /// ID 生成器的按日序列键
    pub fn sequence_key(scope: &str, date: &str) -> String {
        format!("icr:{scope}:{date}")
    }

    /// 店铺详情缓存键
    pub fn shop_key(shop_id: i64) -> String {
        format!("cache:shop:{shop_id}")
    }
}
