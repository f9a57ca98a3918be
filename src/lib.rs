//! Seckill Engine - 秒杀优惠券引擎
//!
//! # 架构概述
//!
//! 在关系型存储前面扛住瞬时抢购洪峰的准入控制核心，外加热点读
//! 路径共用的缓存防护层。四条硬保证：
//!
//! - 库存永不为负 (原子准入脚本 + 持久层条件扣减)
//! - 每用户每券至多一单 (缓存侧标记 + 持久侧复检双防线)
//! - 准入的请求恰好落库一次 (有界队列 + 单消费 worker)
//! - 存储慢 / 缓存大面积失效时优雅降级 (三种读穿策略)
//!
//! # 模块结构
//!
//! ```text
//! src/
//! ├── core/     # 配置、状态组装、指标
//! ├── kv/       # 共享 KV 存储抽象 (Redis / Memory) + 原子脚本
//! ├── id/       # 分布式订单号生成器
//! ├── lock/     # 租约式分布式锁
//! ├── seckill/  # 准入评估器、准入服务、落库 worker
//! ├── cache/    # 三策略读穿缓存客户端
//! ├── db/       # 持久层契约与实现 (SQLite / Memory)
//! ├── shop/     # 店铺读服务 (缓存策略消费方)
//! └── utils/    # 时间、日志
//! ```

pub mod cache;
pub mod core;
pub mod db;
pub mod id;
pub mod kv;
pub mod lock;
pub mod seckill;
pub mod shop;
pub mod utils;

// Re-export 公共类型
pub use cache::{CacheClient, CacheConfig, CacheError};
pub use core::{Config, EngineState, MetricsSnapshot, SeckillMetrics};
pub use db::{MemoryStore, SeckillVoucher, Shop, SqliteStore, VoucherOrder};
pub use id::IdGenerator;
pub use kv::{KvStore, MemoryKv, RedisKv};
pub use lock::DistributedLock;
pub use seckill::{Reservation, SeckillError, SeckillService};
pub use shop::{CacheStrategy, ShopService};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
