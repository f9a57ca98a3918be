//! 秒杀核心
//!
//! 同步准入路径与异步落库路径在此汇合：
//!
//! ```text
//! submit ──> 窗口校验 ──> 签发订单号 ──> 原子准入 ──> 有界队列 ──> 单消费 worker ──> 订单行
//!            (缓存)       (ID 生成器)    (KV 脚本)    (try_send)    (锁+复检+条件扣减)
//! ```
//!
//! # 模块结构
//!
//! - [`admission`] - 原子准入评估器
//! - [`service`] - 订单准入服务 (同步侧)
//! - [`worker`] - 异步落库 worker (异步侧)

pub mod admission;
pub mod service;
pub mod worker;

pub use admission::{Admission, AdmissionEvaluator};
pub use service::SeckillService;
pub use worker::PersistenceWorker;

use thiserror::Error;

use crate::db::RepoError;
use crate::kv::KvError;

/// 跨越队列边界的唯一数据 — 已准入、待落库的预订
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub order_id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    /// 准入时刻 (Unix millis)
    pub admitted_at: i64,
}

/// 秒杀提交的用户可见错误
///
/// 前三类是预期拒绝，不按错误记日志；
/// `Kv`/`Repo` 是基础设施失败；`Overloaded` 是已知的过载丢失路径。
#[derive(Debug, Error)]
pub enum SeckillError {
    #[error("秒杀券不存在")]
    VoucherNotFound,

    #[error("秒杀尚未开始")]
    NotStarted,

    #[error("秒杀已经结束")]
    Ended,

    #[error("秒杀券已经抢空")]
    StockExhausted,

    #[error("不允许重复下单")]
    DuplicateOrder,

    /// 队列满 — 库存已扣但预订无法入队，对外报失败
    #[error("系统繁忙，请稍后再试")]
    Overloaded,

    #[error("存储访问失败: {0}")]
    Kv(#[from] KvError),

    #[error("持久层访问失败: {0}")]
    Repo(#[from] RepoError),

    #[error("缓存数据损坏: {0}")]
    Codec(#[from] serde_json::Error),
}
