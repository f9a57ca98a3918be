//! 店铺读服务 — 缓存策略的配置化消费方
//!
//! 每个实体类型在构造时绑定一种读穿策略 (配置决定，不做方法内
//! 运行时分派的"智能"选择)。店铺详情是最热的查询路径，默认走
//! 逻辑过期；写路径遵循 cache-aside：先写库，再删缓存。

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheClient, CacheResult};
use crate::db::models::Shop;
use crate::db::ShopStore;
use crate::kv::keys;

/// 读穿策略选择 — 按实体类型配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// 直通 + 空值负缓存
    PassThrough,
    /// 键级锁互斥重建
    Mutex,
    /// 逻辑过期 + 后台重建 (最热路径默认)
    #[default]
    LogicalExpire,
}

impl CacheStrategy {
    /// 从配置字符串解析，无法识别时退回默认策略
    pub fn parse(value: &str) -> Self {
        match value {
            "pass-through" => CacheStrategy::PassThrough,
            "mutex" => CacheStrategy::Mutex,
            "logical-expire" => CacheStrategy::LogicalExpire,
            other => {
                tracing::warn!(
                    strategy = other,
                    "unknown cache strategy, falling back to logical-expire"
                );
                CacheStrategy::LogicalExpire
            }
        }
    }
}

/// 店铺读服务
#[derive(Clone)]
pub struct ShopService {
    store: Arc<dyn ShopStore>,
    cache: CacheClient,
    strategy: CacheStrategy,
    ttl: Duration,
}

impl ShopService {
    pub fn new(
        store: Arc<dyn ShopStore>,
        cache: CacheClient,
        strategy: CacheStrategy,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            strategy,
            ttl,
        }
    }

    /// 按 id 查询店铺，走构造时绑定的策略
    pub async fn query_by_id(&self, shop_id: i64) -> CacheResult<Option<Shop>> {
        let key = keys::shop_key(shop_id);
        let store = Arc::clone(&self.store);

        match self.strategy {
            CacheStrategy::PassThrough => {
                self.cache
                    .query_pass_through(&key, self.ttl, move || async move {
                        store.find_shop_by_id(shop_id).await
                    })
                    .await
            }
            CacheStrategy::Mutex => {
                self.cache
                    .query_with_mutex(&key, self.ttl, move || async move {
                        store.find_shop_by_id(shop_id).await
                    })
                    .await
            }
            CacheStrategy::LogicalExpire => {
                self.cache
                    .query_with_logical_expire(&key, self.ttl, move || async move {
                        store.find_shop_by_id(shop_id).await
                    })
                    .await
            }
        }
    }

    /// 逻辑过期策略的预热：活动开始前把热点店铺写进缓存
    pub async fn preload(&self, shop_id: i64) -> CacheResult<Option<Shop>> {
        let shop = self.store.find_shop_by_id(shop_id).await?;
        if let Some(shop) = &shop {
            self.cache
                .set_with_logical_expire(&keys::shop_key(shop_id), shop, self.ttl)
                .await?;
        }
        Ok(shop)
    }

    /// 更新店铺：先写库，再删缓存
    pub async fn update(&self, shop: &Shop) -> CacheResult<()> {
        self.store.update_shop(shop).await?;
        self.cache.invalidate(&keys::shop_key(shop.id)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ShopService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopService")
            .field("strategy", &self.strategy)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
