//! 原子准入评估器
//!
//! 把 KV 层的准入脚本结果映射为业务结果，并在准入成功时
//! 产出待落库的 [`Reservation`]。库存校验、重复校验、扣减、
//! 写标记在存储侧一步完成 — 这是整个系统最重要的正确性保证，
//! 消除了先检查后扣减之间的竞态窗口。

use std::sync::Arc;

use super::Reservation;
use crate::kv::{keys, AdmissionCode, KvResult, KvStore};
use crate::utils::now_millis;

/// 准入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 已扣减一个单位并写入用户标记
    Admitted(Reservation),
    StockExhausted,
    DuplicateOrder,
}

/// 准入评估器
#[derive(Clone)]
pub struct AdmissionEvaluator {
    kv: Arc<dyn KvStore>,
}

impl AdmissionEvaluator {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// 对 (voucher, user) 执行一次原子准入
    ///
    /// 订单号在准入前签发，随预订进入队列。
    pub async fn evaluate(
        &self,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> KvResult<Admission> {
        let code = self.kv.seckill_admit(voucher_id, user_id).await?;
        Ok(match code {
            AdmissionCode::Admitted => Admission::Admitted(Reservation {
                order_id,
                user_id,
                voucher_id,
                admitted_at: now_millis(),
            }),
            AdmissionCode::StockExhausted => Admission::StockExhausted,
            AdmissionCode::DuplicateOrder => Admission::DuplicateOrder,
        })
    }

    /// 发布时把库存计数预载进缓存镜像
    pub async fn preload_stock(&self, voucher_id: i64, stock: i64) -> KvResult<()> {
        self.kv
            .set(&keys::stock_key(voucher_id), &stock.to_string())
            .await
    }
}

impl std::fmt::Debug for AdmissionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionEvaluator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn test_admitted_carries_reservation() {
        let kv = Arc::new(MemoryKv::new());
        let evaluator = AdmissionEvaluator::new(kv);
        evaluator.preload_stock(1, 1).await.unwrap();

        match evaluator.evaluate(1, 42, 9001).await.unwrap() {
            Admission::Admitted(reservation) => {
                assert_eq!(reservation.order_id, 9001);
                assert_eq!(reservation.user_id, 42);
                assert_eq!(reservation.voucher_id, 1);
            }
            other => panic!("expected admission, got {other:?}"),
        }

        // 同一用户第二次必然拒绝
        assert_eq!(
            evaluator.evaluate(1, 42, 9002).await.unwrap(),
            Admission::DuplicateOrder
        );
        // 其他用户在库存耗尽后拒绝
        assert_eq!(
            evaluator.evaluate(1, 43, 9003).await.unwrap(),
            Admission::StockExhausted
        );
    }
}
