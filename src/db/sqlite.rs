//! SQLite 数据存储
//!
//! WAL 模式 + busy_timeout，schema 由 `migrations/` 目录管理。
//! 查询使用运行时绑定，不依赖编译期数据库。

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::Row;

use super::models::{SeckillVoucher, Shop, VoucherOrder};
use super::{RepoError, RepoResult, ShopStore, VoucherOrderStore};

/// SQLite 持久存储
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 打开 (或创建) `db_path` 上的数据库并应用 migrations
    pub async fn new(db_path: &str) -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| RepoError::Database(format!("invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        // 写冲突时等待 5s 而非立即失败
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepoError::Database(format!("migration failed: {e}")))?;

        tracing::info!(db_path, "SQLite store ready (WAL, busy_timeout=5000ms)");
        Ok(Self { pool })
    }

    /// 进程内数据库 — 集成测试用
    pub async fn in_memory() -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| RepoError::Database(e.to_string()))?;

        // 单连接池：内存库的生命周期绑定在唯一连接上
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepoError::Database(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn voucher_from_row(row: &sqlx::sqlite::SqliteRow) -> SeckillVoucher {
    SeckillVoucher {
        voucher_id: row.get("voucher_id"),
        shop_id: row.get("shop_id"),
        stock: row.get("stock"),
        begin_time: row.get("begin_time"),
        end_time: row.get("end_time"),
    }
}

fn order_from_row(row: &sqlx::sqlite::SqliteRow) -> VoucherOrder {
    VoucherOrder {
        id: row.get("id"),
        user_id: row.get("user_id"),
        voucher_id: row.get("voucher_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl VoucherOrderStore for SqliteStore {
    async fn insert_voucher(&self, voucher: &SeckillVoucher) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO seckill_voucher (voucher_id, shop_id, stock, begin_time, end_time) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(voucher.voucher_id)
        .bind(voucher.shop_id)
        .bind(voucher.stock)
        .bind(voucher.begin_time)
        .bind(voucher.end_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_voucher_by_id(&self, voucher_id: i64) -> RepoResult<Option<SeckillVoucher>> {
        let row = sqlx::query(
            "SELECT voucher_id, shop_id, stock, begin_time, end_time \
             FROM seckill_voucher WHERE voucher_id = ?",
        )
        .bind(voucher_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(voucher_from_row))
    }

    async fn find_stock_by_id(&self, voucher_id: i64) -> RepoResult<Option<i64>> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM seckill_voucher WHERE voucher_id = ?")
                .bind(voucher_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(stock)
    }

    async fn conditional_decrement_stock(&self, voucher_id: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE seckill_voucher SET stock = stock - 1 \
             WHERE voucher_id = ? AND stock > 0",
        )
        .bind(voucher_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_orders_by_user_and_voucher(
        &self,
        user_id: i64,
        voucher_id: i64,
    ) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM voucher_order WHERE user_id = ? AND voucher_id = ?",
        )
        .bind(user_id)
        .bind(voucher_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_order(&self, order: &VoucherOrder) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO voucher_order (id, user_id, voucher_id, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.voucher_id)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_orders_by_voucher(&self, voucher_id: i64) -> RepoResult<Vec<VoucherOrder>> {
        let rows = sqlx::query(
            "SELECT id, user_id, voucher_id, created_at \
             FROM voucher_order WHERE voucher_id = ? ORDER BY id",
        )
        .bind(voucher_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(order_from_row).collect())
    }
}

#[async_trait]
impl ShopStore for SqliteStore {
    async fn insert_shop(&self, shop: &Shop) -> RepoResult<()> {
        sqlx::query("INSERT INTO shop (id, name, type_id, updated_at) VALUES (?, ?, ?, ?)")
            .bind(shop.id)
            .bind(&shop.name)
            .bind(shop.type_id)
            .bind(shop.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_shop_by_id(&self, shop_id: i64) -> RepoResult<Option<Shop>> {
        let row = sqlx::query("SELECT id, name, type_id, updated_at FROM shop WHERE id = ?")
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Shop {
            id: r.get("id"),
            name: r.get("name"),
            type_id: r.get("type_id"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn update_shop(&self, shop: &Shop) -> RepoResult<()> {
        let result =
            sqlx::query("UPDATE shop SET name = ?, type_id = ?, updated_at = ? WHERE id = ?")
                .bind(&shop.name)
                .bind(shop.type_id)
                .bind(shop.updated_at)
                .bind(shop.id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("shop {}", shop.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_conditional_decrement_and_unique_order() {
        let store = SqliteStore::in_memory().await.expect("open in-memory db");

        let voucher = SeckillVoucher {
            voucher_id: 1,
            shop_id: 1,
            stock: 1,
            begin_time: 0,
            end_time: i64::MAX,
        };
        store.insert_voucher(&voucher).await.unwrap();

        assert!(store.conditional_decrement_stock(1).await.unwrap());
        // 库存见底后条件更新不命中任何行
        assert!(!store.conditional_decrement_stock(1).await.unwrap());
        assert_eq!(store.find_stock_by_id(1).await.unwrap(), Some(0));

        let order = VoucherOrder {
            id: 10,
            user_id: 3,
            voucher_id: 1,
            created_at: 0,
        };
        store.insert_order(&order).await.unwrap();

        let duplicate = VoucherOrder { id: 11, ..order };
        let err = store.insert_order(&duplicate).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)), "got {err:?}");
    }
}
