//! 持久层
//!
//! 秒杀核心按接口消费关系型存储：trait 定义映射器契约，
//! 两个实现分别服务生产 (SQLite) 与测试/嵌入 (内存)。
//!
//! # 模块结构
//!
//! - [`models`] - 数据模型
//! - [`MemoryStore`] - DashMap 内存实现
//! - [`SqliteStore`] - sqlx SQLite 实现 (WAL + migrations)

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryStore;
pub use models::{SeckillVoucher, Shop, VoucherOrder};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

/// 持久层错误
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            return RepoError::Duplicate(db_err.to_string());
        }
        RepoError::Database(err.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// 秒杀券与订单的映射器契约
///
/// 库存扣减只有一条入口：`conditional_decrement_stock`。
#[async_trait]
pub trait VoucherOrderStore: Send + Sync {
    async fn insert_voucher(&self, voucher: &SeckillVoucher) -> RepoResult<()>;

    async fn find_voucher_by_id(&self, voucher_id: i64) -> RepoResult<Option<SeckillVoucher>>;

    /// 读取持久库存余量
    async fn find_stock_by_id(&self, voucher_id: i64) -> RepoResult<Option<i64>>;

    /// `stock = stock - 1 WHERE voucher_id = ? AND stock > 0`
    ///
    /// 返回是否扣减到一行。零行即持久库存已耗尽。
    async fn conditional_decrement_stock(&self, voucher_id: i64) -> RepoResult<bool>;

    /// 持久侧重复下单校验
    async fn count_orders_by_user_and_voucher(
        &self,
        user_id: i64,
        voucher_id: i64,
    ) -> RepoResult<i64>;

    async fn insert_order(&self, order: &VoucherOrder) -> RepoResult<()>;

    async fn list_orders_by_voucher(&self, voucher_id: i64) -> RepoResult<Vec<VoucherOrder>>;
}

/// 店铺映射器契约 (缓存客户端的回源目标)
#[async_trait]
pub trait ShopStore: Send + Sync {
    async fn insert_shop(&self, shop: &Shop) -> RepoResult<()>;

    async fn find_shop_by_id(&self, shop_id: i64) -> RepoResult<Option<Shop>>;

    async fn update_shop(&self, shop: &Shop) -> RepoResult<()>;
}
