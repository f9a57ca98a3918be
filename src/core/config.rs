//! 引擎配置
//!
//! 所有配置项都可以通过环境变量覆盖：
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | REDIS_URL | redis://127.0.0.1:6379 | KV 存储地址 |
//! | DB_PATH | seckill.db | SQLite 数据库路径 |
//! | SECKILL_QUEUE_CAPACITY | 1024 | 准入→落库队列容量 |
//! | ORDER_LOCK_TTL_SECS | 10 | 落库用户锁租约 (秒) |
//! | ID_EPOCH_SECS | 1640995200 | 订单号自定义纪元 |
//! | CACHE_NULL_TTL_SECS | 120 | 空值负缓存 TTL (秒) |
//! | CACHE_LOCK_TTL_SECS | 10 | 缓存重建锁租约 (秒) |
//! | CACHE_RETRY_INTERVAL_MS | 50 | 互斥策略重试间隔 (毫秒) |
//! | CACHE_WAIT_TIMEOUT_MS | 2000 | 互斥策略总等待上限 (毫秒) |
//! | CACHE_REBUILD_WORKERS | 10 | 后台重建 worker 数 |
//! | CACHE_REBUILD_QUEUE | 256 | 后台重建队列容量 |
//! | CACHE_SHOP_TTL_SECS | 1800 | 店铺缓存 TTL (秒) |
//! | SHOP_CACHE_STRATEGY | logical-expire | 店铺读策略 |

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::id::DEFAULT_EPOCH_SECS;

/// 引擎配置
#[derive(Debug, Clone)]
pub struct Config {
    /// KV 存储地址 (RedisKv 部署时使用)
    pub redis_url: String,
    /// SQLite 数据库路径
    pub db_path: String,
    /// 准入→落库队列容量；满即过载
    pub queue_capacity: usize,
    /// 落库用户锁租约 (秒)
    pub order_lock_ttl_secs: u64,
    /// 订单号纪元 (秒)
    pub id_epoch_secs: i64,
    /// 空值负缓存 TTL (秒)
    pub cache_null_ttl_secs: u64,
    /// 缓存重建锁租约 (秒)
    pub cache_lock_ttl_secs: u64,
    /// 互斥策略重试间隔 (毫秒)
    pub cache_retry_interval_ms: u64,
    /// 互斥策略总等待上限 (毫秒)
    pub cache_wait_timeout_ms: u64,
    /// 后台重建 worker 数
    pub rebuild_workers: usize,
    /// 后台重建队列容量
    pub rebuild_queue_capacity: usize,
    /// 店铺缓存 TTL (秒)
    pub shop_cache_ttl_secs: u64,
    /// 店铺读策略: pass-through | mutex | logical-expire
    pub shop_cache_strategy: String,
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "seckill.db".into()),
            queue_capacity: std::env::var("SECKILL_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
            order_lock_ttl_secs: std::env::var("ORDER_LOCK_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            id_epoch_secs: std::env::var("ID_EPOCH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EPOCH_SECS),
            cache_null_ttl_secs: std::env::var("CACHE_NULL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            cache_lock_ttl_secs: std::env::var("CACHE_LOCK_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            cache_retry_interval_ms: std::env::var("CACHE_RETRY_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            cache_wait_timeout_ms: std::env::var("CACHE_WAIT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            rebuild_workers: std::env::var("CACHE_REBUILD_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            rebuild_queue_capacity: std::env::var("CACHE_REBUILD_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            shop_cache_ttl_secs: std::env::var("CACHE_SHOP_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
            shop_cache_strategy: std::env::var("SHOP_CACHE_STRATEGY")
                .unwrap_or_else(|_| "logical-expire".into()),
        }
    }

    /// 缓存客户端子配置
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            null_ttl: Duration::from_secs(self.cache_null_ttl_secs),
            lock_ttl: Duration::from_secs(self.cache_lock_ttl_secs),
            retry_interval: Duration::from_millis(self.cache_retry_interval_ms),
            wait_timeout: Duration::from_millis(self.cache_wait_timeout_ms),
        }
    }

    /// 落库用户锁租约
    pub fn order_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.order_lock_ttl_secs)
    }

    /// 店铺缓存 TTL
    pub fn shop_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.shop_cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
