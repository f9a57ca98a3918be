//! 订单准入服务 (同步侧)
//!
//! `submit` 是请求线程眼中的全部秒杀流程：窗口校验、签发订单号、
//! 原子准入、非阻塞入队。全程不触达持久层 — 昂贵的事务性落库
//! 移交给队列另一端的单消费 worker。
//!
//! userId 一律显式传参，不读任何环境态。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::admission::{Admission, AdmissionEvaluator};
use super::{Reservation, SeckillError};
use crate::core::metrics::SeckillMetrics;
use crate::db::models::SeckillVoucher;
use crate::db::VoucherOrderStore;
use crate::id::IdGenerator;
use crate::kv::{keys, KvStore};
use crate::utils::now_millis;

/// 订单号的 ID 生成 scope
const ORDER_ID_SCOPE: &str = "order";

/// 订单准入服务
#[derive(Clone)]
pub struct SeckillService {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn VoucherOrderStore>,
    evaluator: AdmissionEvaluator,
    id_gen: IdGenerator,
    tx: mpsc::Sender<Reservation>,
    metrics: Arc<SeckillMetrics>,
}

impl SeckillService {
    /// 创建服务，返回给落库 worker 的队列接收端
    ///
    /// `queue_capacity` 是准入与落库之间唯一的缓冲；满即过载。
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<dyn VoucherOrderStore>,
        id_gen: IdGenerator,
        metrics: Arc<SeckillMetrics>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Reservation>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let evaluator = AdmissionEvaluator::new(Arc::clone(&kv));
        let service = Self {
            kv,
            store,
            evaluator,
            id_gen,
            tx,
            metrics,
        };
        (service, rx)
    }

    /// 发布秒杀券：写持久行，预载售卖窗口与库存计数进缓存镜像
    pub async fn publish_voucher(&self, voucher: &SeckillVoucher) -> Result<(), SeckillError> {
        self.store.insert_voucher(voucher).await?;
        self.kv
            .set(
                &keys::voucher_key(voucher.voucher_id),
                &serde_json::to_string(voucher)?,
            )
            .await?;
        self.evaluator
            .preload_stock(voucher.voucher_id, voucher.stock)
            .await?;
        tracing::info!(
            voucher_id = voucher.voucher_id,
            stock = voucher.stock,
            "Seckill voucher published"
        );
        Ok(())
    }

    /// 提交一次秒杀请求，成功返回订单号
    pub async fn submit(&self, voucher_id: i64, user_id: i64) -> Result<i64, SeckillError> {
        // 1. 售卖窗口校验 — 读发布时预载的缓存，不触持久层
        let raw = self
            .kv
            .get(&keys::voucher_key(voucher_id))
            .await?
            .ok_or(SeckillError::VoucherNotFound)?;
        let voucher: SeckillVoucher = serde_json::from_str(&raw)?;
        let now = now_millis();
        if now < voucher.begin_time {
            return Err(SeckillError::NotStarted);
        }
        if now >= voucher.end_time {
            return Err(SeckillError::Ended);
        }

        // 2. 签发订单号 — 存储不可达时立即失败，绝不补发
        let order_id = self.id_gen.next_id(ORDER_ID_SCOPE).await?;

        // 3. 原子准入
        match self.evaluator.evaluate(voucher_id, user_id, order_id).await? {
            Admission::StockExhausted => {
                self.metrics.incr_stock_exhausted();
                tracing::debug!(voucher_id, user_id, "seckill rejected: stock exhausted");
                Err(SeckillError::StockExhausted)
            }
            Admission::DuplicateOrder => {
                self.metrics.incr_duplicate_order();
                tracing::debug!(voucher_id, user_id, "seckill rejected: duplicate order");
                Err(SeckillError::DuplicateOrder)
            }
            Admission::Admitted(reservation) => self.enqueue(reservation),
        }
    }

    /// 非阻塞入队 — 队列满是过载，对外报失败而不是悄悄丢弃
    fn enqueue(&self, reservation: Reservation) -> Result<i64, SeckillError> {
        let order_id = reservation.order_id;
        match self.tx.try_send(reservation) {
            Ok(()) => {
                self.metrics.incr_admitted();
                Ok(order_id)
            }
            Err(TrySendError::Full(lost)) => {
                // 库存已在准入时扣减 — 这单已丢失，必须进告警
                self.metrics.incr_queue_full();
                tracing::error!(
                    order_id = lost.order_id,
                    user_id = lost.user_id,
                    voucher_id = lost.voucher_id,
                    "persistence queue full, admitted reservation lost"
                );
                Err(SeckillError::Overloaded)
            }
            Err(TrySendError::Closed(lost)) => {
                self.metrics.incr_queue_full();
                tracing::error!(
                    order_id = lost.order_id,
                    "persistence queue closed, admitted reservation lost"
                );
                Err(SeckillError::Overloaded)
            }
        }
    }

    /// 指标快照透出
    pub fn metrics(&self) -> &SeckillMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for SeckillService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeckillService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::id::{IdGenerator, DEFAULT_EPOCH_SECS};
    use crate::kv::MemoryKv;

    fn service(queue_capacity: usize) -> (SeckillService, mpsc::Receiver<Reservation>) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let store = Arc::new(MemoryStore::new());
        let id_gen = IdGenerator::new(Arc::clone(&kv), DEFAULT_EPOCH_SECS);
        SeckillService::new(
            kv,
            store,
            id_gen,
            Arc::new(SeckillMetrics::new()),
            queue_capacity,
        )
    }

    fn voucher(id: i64, stock: i64, begin: i64, end: i64) -> SeckillVoucher {
        SeckillVoucher {
            voucher_id: id,
            shop_id: 1,
            stock,
            begin_time: begin,
            end_time: end,
        }
    }

    #[tokio::test]
    async fn test_submit_outside_window_is_rejected() {
        let (service, _rx) = service(16);
        let now = now_millis();

        service
            .publish_voucher(&voucher(1, 10, now + 60_000, now + 120_000))
            .await
            .unwrap();
        assert!(matches!(
            service.submit(1, 100).await,
            Err(SeckillError::NotStarted)
        ));

        service
            .publish_voucher(&voucher(2, 10, now - 120_000, now - 60_000))
            .await
            .unwrap();
        assert!(matches!(
            service.submit(2, 100).await,
            Err(SeckillError::Ended)
        ));
    }

    #[tokio::test]
    async fn test_submit_unknown_voucher() {
        let (service, _rx) = service(16);
        assert!(matches!(
            service.submit(404, 1).await,
            Err(SeckillError::VoucherNotFound)
        ));
    }

    #[tokio::test]
    async fn test_full_queue_surfaces_overload() {
        let (service, _rx) = service(1);
        let now = now_millis();
        service
            .publish_voucher(&voucher(1, 10, now - 1_000, now + 60_000))
            .await
            .unwrap();

        // 容量 1、无消费者：第一单占满队列
        service.submit(1, 100).await.expect("first submit");
        let err = service.submit(1, 101).await.unwrap_err();
        assert!(matches!(err, SeckillError::Overloaded));

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.admitted, 1);
        assert_eq!(snapshot.queue_full, 1);
    }

    #[tokio::test]
    async fn test_duplicate_submit_rejected_before_queue() {
        let (service, mut rx) = service(16);
        let now = now_millis();
        service
            .publish_voucher(&voucher(1, 10, now - 1_000, now + 60_000))
            .await
            .unwrap();

        let order_id = service.submit(1, 7).await.expect("first submit");
        assert!(matches!(
            service.submit(1, 7).await,
            Err(SeckillError::DuplicateOrder)
        ));

        // 队列里只有第一单
        let reservation = rx.recv().await.expect("one reservation");
        assert_eq!(reservation.order_id, order_id);
        assert!(rx.try_recv().is_err());
    }
}
