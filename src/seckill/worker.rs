//! 异步落库 worker (异步侧)
//!
//! 队列的唯一消费者，顺序处理每条预订：
//! 用户锁 → 持久侧重复复检 → 条件扣减 → 写订单行 → 无条件放锁。
//! 任何一步失败都是记日志后丢弃，绝不上抛 — 原调用方早已收到响应。
//!
//! 单消费是刻意的简化：以落库吞吐换取持久层上无重排、无双扣的
//! 平凡正确性。扩容需要按 userId 一致性哈希分片队列、每片单消费，
//! 重新推导按用户串行的保证后才能并行。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Reservation;
use crate::core::metrics::SeckillMetrics;
use crate::db::models::VoucherOrder;
use crate::db::{RepoResult, VoucherOrderStore};
use crate::lock::DistributedLock;
use crate::utils::now_millis;

/// 单条预订的落库结局 (除持久层错误外)
#[derive(Debug, PartialEq, Eq)]
enum PersistOutcome {
    /// 订单行已写入，持久库存已扣减
    Completed,
    /// 持久层已有同 (user, voucher) 订单 — 缓存侧校验被绕过时的兜底
    DuplicateInStore,
    /// 条件扣减命中零行 — 落库期良性竞态，丢弃
    StockRaceLost,
}

/// 落库 worker
pub struct PersistenceWorker {
    store: Arc<dyn VoucherOrderStore>,
    lock: DistributedLock,
    metrics: Arc<SeckillMetrics>,
    lock_ttl: Duration,
}

impl PersistenceWorker {
    pub fn new(
        store: Arc<dyn VoucherOrderStore>,
        lock: DistributedLock,
        metrics: Arc<SeckillMetrics>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            metrics,
            lock_ttl,
        }
    }

    /// 运行 worker (阻塞直到取消或队列关闭)
    pub async fn run(self, mut rx: mpsc::Receiver<Reservation>, shutdown: CancellationToken) {
        tracing::info!("Seckill persistence worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Persistence worker received shutdown signal");
                    break;
                }
                maybe = rx.recv() => {
                    let Some(reservation) = maybe else {
                        tracing::info!("Reservation queue closed, persistence worker stopping");
                        break;
                    };
                    self.persist(reservation).await;
                }
            }
        }
    }

    /// 处理一条预订：IDLE → LOCKING → PERSISTING → IDLE
    async fn persist(&self, reservation: Reservation) {
        let lock_name = format!("order:{}", reservation.user_id);

        // LOCKING — 拿不到锁就丢弃：重复校验保证同一用户不会因此下成两单，
        // 丢掉的只可能是一单合法准入，由 lock_dropped 计数器盯住
        let token = match self.lock.try_acquire(&lock_name, self.lock_ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.metrics.incr_lock_dropped();
                tracing::warn!(
                    order_id = reservation.order_id,
                    user_id = reservation.user_id,
                    "user lock busy, dropping reservation"
                );
                return;
            }
            Err(e) => {
                self.metrics.incr_lock_dropped();
                tracing::error!(
                    order_id = reservation.order_id,
                    error = %e,
                    "lock acquisition failed, dropping reservation"
                );
                return;
            }
        };

        // PERSISTING
        let outcome = self.persist_locked(&reservation).await;

        // 无条件放锁 — 错误也只记日志，租约 TTL 是最后兜底
        if let Err(e) = self.lock.release(&lock_name, &token).await {
            tracing::error!(
                user_id = reservation.user_id,
                error = %e,
                "failed to release user lock"
            );
        }

        match outcome {
            Ok(PersistOutcome::Completed) => {
                self.metrics.incr_persisted();
                tracing::debug!(
                    order_id = reservation.order_id,
                    user_id = reservation.user_id,
                    voucher_id = reservation.voucher_id,
                    "order persisted"
                );
            }
            Ok(PersistOutcome::DuplicateInStore) => {
                self.metrics.incr_store_duplicate_dropped();
                tracing::warn!(
                    order_id = reservation.order_id,
                    user_id = reservation.user_id,
                    "duplicate order found in store, dropping reservation"
                );
            }
            Ok(PersistOutcome::StockRaceLost) => {
                self.metrics.incr_stock_race_dropped();
                tracing::warn!(
                    order_id = reservation.order_id,
                    voucher_id = reservation.voucher_id,
                    "durable stock exhausted at persistence time, dropping reservation"
                );
            }
            Err(e) => {
                self.metrics.incr_persist_failed();
                tracing::error!(
                    order_id = reservation.order_id,
                    error = %e,
                    "order persistence failed"
                );
            }
        }
    }

    async fn persist_locked(&self, reservation: &Reservation) -> RepoResult<PersistOutcome> {
        // 持久侧第二道重复防线，独立于准入脚本的缓存侧校验
        let existing = self
            .store
            .count_orders_by_user_and_voucher(reservation.user_id, reservation.voucher_id)
            .await?;
        if existing > 0 {
            return Ok(PersistOutcome::DuplicateInStore);
        }

        if !self
            .store
            .conditional_decrement_stock(reservation.voucher_id)
            .await?
        {
            return Ok(PersistOutcome::StockRaceLost);
        }

        self.store
            .insert_order(&VoucherOrder {
                id: reservation.order_id,
                user_id: reservation.user_id,
                voucher_id: reservation.voucher_id,
                created_at: now_millis(),
            })
            .await?;
        Ok(PersistOutcome::Completed)
    }
}

impl std::fmt::Debug for PersistenceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWorker")
            .field("lock_ttl", &self.lock_ttl)
            .finish_non_exhaustive()
    }
}
