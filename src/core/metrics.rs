//! 秒杀指标计数器
//!
//! 两类丢失路径 (队列满、落库期竞态) 是已知且被接受的设计取舍，
//! 必须可观测：queue_full 对接告警，stock_race_dropped 对接对账。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 引擎级原子计数器
#[derive(Debug, Default)]
pub struct SeckillMetrics {
    /// 准入成功并成功入队
    admitted: AtomicU64,
    /// 准入拒绝：库存不足
    stock_exhausted: AtomicU64,
    /// 准入拒绝：重复下单
    duplicate_order: AtomicU64,
    /// 准入成功但队列已满 — 已扣减的库存随之丢失，需告警
    queue_full: AtomicU64,
    /// 落库丢弃：用户锁竞争失败
    lock_dropped: AtomicU64,
    /// 落库丢弃：持久层已有同 (user, voucher) 订单
    store_duplicate_dropped: AtomicU64,
    /// 落库丢弃：持久库存竞态耗尽 — 对账指标
    stock_race_dropped: AtomicU64,
    /// 落库失败：持久层错误
    persist_failed: AtomicU64,
    /// 订单行成功写入
    persisted: AtomicU64,
}

impl SeckillMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_stock_exhausted(&self) {
        self.stock_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_duplicate_order(&self) {
        self.duplicate_order.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_lock_dropped(&self) {
        self.lock_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_store_duplicate_dropped(&self) {
        self.store_duplicate_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_stock_race_dropped(&self) {
        self.stock_race_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_persist_failed(&self) {
        self.persist_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// 一致性快照 (各计数器独立读取，非跨计数器原子)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            stock_exhausted: self.stock_exhausted.load(Ordering::Relaxed),
            duplicate_order: self.duplicate_order.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            lock_dropped: self.lock_dropped.load(Ordering::Relaxed),
            store_duplicate_dropped: self.store_duplicate_dropped.load(Ordering::Relaxed),
            stock_race_dropped: self.stock_race_dropped.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
        }
    }
}

/// 计数器快照
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub stock_exhausted: u64,
    pub duplicate_order: u64,
    pub queue_full: u64,
    pub lock_dropped: u64,
    pub store_duplicate_dropped: u64,
    pub stock_race_dropped: u64,
    pub persist_failed: u64,
    pub persisted: u64,
}

impl MetricsSnapshot {
    /// 准入与落库之间的在途/丢失差额 — 对账入口
    pub fn admitted_not_persisted(&self) -> u64 {
        self.admitted.saturating_sub(
            self.persisted + self.store_duplicate_dropped + self.stock_race_dropped,
        )
    }
}
