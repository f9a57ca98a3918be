//! 内存数据存储
//!
//! DashMap 实现的映射器，用于测试与单进程嵌入部署。
//! 条件扣减在分片锁内完成读-改-写，语义与 SQL 条件更新一致。

use async_trait::async_trait;
use dashmap::DashMap;

use super::models::{SeckillVoucher, Shop, VoucherOrder};
use super::{RepoError, RepoResult, ShopStore, VoucherOrderStore};

/// 进程内数据存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    vouchers: DashMap<i64, SeckillVoucher>,
    /// 订单，按订单 id 索引
    orders: DashMap<i64, VoucherOrder>,
    shops: DashMap<i64, Shop>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VoucherOrderStore for MemoryStore {
    async fn insert_voucher(&self, voucher: &SeckillVoucher) -> RepoResult<()> {
        if self.vouchers.contains_key(&voucher.voucher_id) {
            return Err(RepoError::Duplicate(format!(
                "voucher {}",
                voucher.voucher_id
            )));
        }
        self.vouchers.insert(voucher.voucher_id, voucher.clone());
        Ok(())
    }

    async fn find_voucher_by_id(&self, voucher_id: i64) -> RepoResult<Option<SeckillVoucher>> {
        Ok(self.vouchers.get(&voucher_id).map(|v| v.value().clone()))
    }

    async fn find_stock_by_id(&self, voucher_id: i64) -> RepoResult<Option<i64>> {
        Ok(self.vouchers.get(&voucher_id).map(|v| v.stock))
    }

    async fn conditional_decrement_stock(&self, voucher_id: i64) -> RepoResult<bool> {
        // get_mut 持有分片写锁 — 读改写原子
        match self.vouchers.get_mut(&voucher_id) {
            Some(mut voucher) if voucher.stock > 0 => {
                voucher.stock -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_orders_by_user_and_voucher(
        &self,
        user_id: i64,
        voucher_id: i64,
    ) -> RepoResult<i64> {
        let count = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.voucher_id == voucher_id)
            .count();
        Ok(count as i64)
    }

    async fn insert_order(&self, order: &VoucherOrder) -> RepoResult<()> {
        // 与持久层唯一索引同等的约束
        let duplicate = self
            .orders
            .iter()
            .any(|o| o.user_id == order.user_id && o.voucher_id == order.voucher_id);
        if duplicate {
            return Err(RepoError::Duplicate(format!(
                "order (user {}, voucher {})",
                order.user_id, order.voucher_id
            )));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_orders_by_voucher(&self, voucher_id: i64) -> RepoResult<Vec<VoucherOrder>> {
        let mut orders: Vec<VoucherOrder> = self
            .orders
            .iter()
            .filter(|o| o.voucher_id == voucher_id)
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }
}

#[async_trait]
impl ShopStore for MemoryStore {
    async fn insert_shop(&self, shop: &Shop) -> RepoResult<()> {
        self.shops.insert(shop.id, shop.clone());
        Ok(())
    }

    async fn find_shop_by_id(&self, shop_id: i64) -> RepoResult<Option<Shop>> {
        Ok(self.shops.get(&shop_id).map(|s| s.value().clone()))
    }

    async fn update_shop(&self, shop: &Shop) -> RepoResult<()> {
        match self.shops.get_mut(&shop.id) {
            Some(mut existing) => {
                *existing = shop.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound(format!("shop {}", shop.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voucher(id: i64, stock: i64) -> SeckillVoucher {
        SeckillVoucher {
            voucher_id: id,
            shop_id: 1,
            stock,
            begin_time: 0,
            end_time: i64::MAX,
        }
    }

    #[tokio::test]
    async fn test_conditional_decrement_stops_at_zero() {
        let store = MemoryStore::new();
        store.insert_voucher(&voucher(1, 2)).await.unwrap();

        assert!(store.conditional_decrement_stock(1).await.unwrap());
        assert!(store.conditional_decrement_stock(1).await.unwrap());
        assert!(!store.conditional_decrement_stock(1).await.unwrap());
        assert_eq!(store.find_stock_by_id(1).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_insert_order_enforces_user_voucher_uniqueness() {
        let store = MemoryStore::new();
        let order = VoucherOrder {
            id: 1,
            user_id: 5,
            voucher_id: 9,
            created_at: 0,
        };
        store.insert_order(&order).await.unwrap();

        let second = VoucherOrder { id: 2, ..order };
        let err = store.insert_order(&second).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
        assert_eq!(
            store
                .count_orders_by_user_and_voucher(5, 9)
                .await
                .unwrap(),
            1
        );
    }
}
