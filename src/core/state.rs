//! 引擎状态 - 持有所有服务的共享引用
//!
//! `EngineState::initialize` 按依赖顺序组装对象图并启动落库 worker：
//!
//! 1. 指标、ID 生成器、分布式锁 (叶子组件)
//! 2. 准入服务 + 有界队列
//! 3. 落库 worker (tokio 任务，CancellationToken 关停)
//! 4. 重建池、缓存客户端、店铺读服务
//!
//! 所有字段 Arc 浅拷贝，`EngineState` 可廉价 Clone 进各处理路径。

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheClient, RebuildPool};
use crate::core::config::Config;
use crate::core::metrics::SeckillMetrics;
use crate::db::{ShopStore, VoucherOrderStore};
use crate::id::IdGenerator;
use crate::kv::KvStore;
use crate::lock::DistributedLock;
use crate::seckill::{PersistenceWorker, SeckillService};
use crate::shop::{CacheStrategy, ShopService};

/// 引擎状态
#[derive(Clone)]
pub struct EngineState {
    pub config: Config,
    pub kv: Arc<dyn KvStore>,
    /// 订单准入服务 (同步侧入口)
    pub seckill: SeckillService,
    /// 店铺读服务 (缓存策略消费方)
    pub shops: ShopService,
    /// 读穿缓存客户端 (其他热点实体可直接复用)
    pub cache: CacheClient,
    pub metrics: Arc<SeckillMetrics>,
    shutdown: CancellationToken,
    worker_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl EngineState {
    /// 组装引擎并启动落库 worker
    ///
    /// `kv` 与 `store` 由部署方选择实现：生产为 `RedisKv` + `SqliteStore`，
    /// 测试/嵌入为 `MemoryKv` + `MemoryStore`。
    pub fn initialize<K, S>(config: Config, kv: Arc<K>, store: Arc<S>) -> Self
    where
        K: KvStore + 'static,
        S: VoucherOrderStore + ShopStore + 'static,
    {
        let kv: Arc<dyn KvStore> = kv;
        let order_store: Arc<dyn VoucherOrderStore> = store.clone();
        let shop_store: Arc<dyn ShopStore> = store;

        let metrics = Arc::new(SeckillMetrics::new());
        let lock = DistributedLock::new(Arc::clone(&kv));
        let id_gen = IdGenerator::new(Arc::clone(&kv), config.id_epoch_secs);

        // 同步侧：准入服务 + 有界队列
        let (seckill, rx) = SeckillService::new(
            Arc::clone(&kv),
            Arc::clone(&order_store),
            id_gen,
            Arc::clone(&metrics),
            config.queue_capacity,
        );

        // 异步侧：单消费落库 worker
        let worker = PersistenceWorker::new(
            order_store,
            lock.clone(),
            Arc::clone(&metrics),
            config.order_lock_ttl(),
        );
        let shutdown = CancellationToken::new();
        let worker_handle = tokio::spawn(worker.run(rx, shutdown.clone()));

        // 缓存防护层
        let rebuild = RebuildPool::new(config.rebuild_workers, config.rebuild_queue_capacity);
        let cache = CacheClient::new(
            Arc::clone(&kv),
            lock,
            rebuild,
            config.cache_config(),
        );
        let shops = ShopService::new(
            shop_store,
            cache.clone(),
            CacheStrategy::parse(&config.shop_cache_strategy),
            config.shop_cache_ttl(),
        );

        tracing::info!(
            queue_capacity = config.queue_capacity,
            shop_cache_strategy = %config.shop_cache_strategy,
            "Seckill engine initialized"
        );

        Self {
            config,
            kv,
            seckill,
            shops,
            cache,
            metrics,
            shutdown,
            worker_handle: Arc::new(tokio::sync::Mutex::new(Some(worker_handle))),
        }
    }

    /// 停止落库 worker 并等待其退出
    ///
    /// 队列中尚未消费的预订不再处理 — 与进程崩溃同样的丢失面，
    /// 由 admitted/persisted 计数差额对账。
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.worker_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "persistence worker join failed");
        }
        tracing::info!("Seckill engine stopped");
    }
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
