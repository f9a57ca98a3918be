//! 缓存防护层测试
//!
//! 三种读穿策略的击穿/穿透行为：互斥重建只放一个回源、
//! 逻辑过期读者零阻塞、直通策略的空值负缓存。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use seckill_engine::cache::{CacheClient, CacheConfig, RebuildPool};
use seckill_engine::db::{RepoError, ShopStore};
use seckill_engine::kv::keys;
use seckill_engine::lock::DistributedLock;
use seckill_engine::{CacheStrategy, KvStore, MemoryKv, MemoryStore, Shop, ShopService};

fn cache_client() -> CacheClient {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let lock = DistributedLock::new(Arc::clone(&kv));
    CacheClient::new(
        kv,
        lock,
        RebuildPool::new(4, 32),
        CacheConfig {
            retry_interval: Duration::from_millis(10),
            ..CacheConfig::default()
        },
    )
}

fn shop(id: i64, name: &str) -> Shop {
    Shop {
        id,
        name: name.to_string(),
        type_id: 1,
        updated_at: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mutex_stampede_issues_single_source_query() {
    let client = cache_client();
    let source_calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let client = client.clone();
        let source_calls = Arc::clone(&source_calls);
        handles.push(tokio::spawn(async move {
            client
                .query_with_mutex("cache:shop:1", Duration::from_secs(60), move || async move {
                    source_calls.fetch_add(1, Ordering::SeqCst);
                    // 放大回源耗时，让 50 个读者真正挤在重建窗口里
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<Option<Shop>, RepoError>(Some(shop(1, "热门店")))
                })
                .await
                .expect("mutex read")
        }));
    }

    for handle in handles {
        let value = handle.await.expect("reader panicked");
        assert_eq!(value, Some(shop(1, "热门店")), "all readers see the same value");
    }
    assert_eq!(source_calls.load(Ordering::SeqCst), 1, "source queried exactly once");
}

#[tokio::test]
async fn test_pass_through_caches_negative_result() {
    let client = cache_client();
    let source_calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let source_calls = Arc::clone(&source_calls);
        let result = client
            .query_pass_through::<Shop, _, _>("cache:shop:404", Duration::from_secs(60), move || async move {
                source_calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .expect("pass-through read");
        assert_eq!(result, None);
    }

    // 第一次 miss 回源并写入空值哨兵，之后直接命中负缓存
    assert_eq!(source_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logical_expire_serves_stale_without_blocking() {
    let client = cache_client();
    let key = "cache:shop:7";

    // 预热一条立即过期的缓存
    client
        .set_with_logical_expire(key, &shop(7, "旧数据"), Duration::ZERO)
        .await
        .unwrap();

    let source_calls = Arc::new(AtomicUsize::new(0));

    // 第一读：返回旧值，触发后台重建 (回源耗时 300ms)
    let calls = Arc::clone(&source_calls);
    let started = Instant::now();
    let first = client
        .query_with_logical_expire(key, Duration::from_secs(60), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<Option<Shop>, RepoError>(Some(shop(7, "新数据")))
        })
        .await
        .expect("first read");
    let elapsed = started.elapsed();

    assert_eq!(first, Some(shop(7, "旧数据")), "stale value served immediately");
    assert!(
        elapsed < Duration::from_millis(150),
        "reader must not wait for rebuild, took {elapsed:?}"
    );

    // 重建在途期间第二读：锁被占，不再触发回源，仍旧值
    let calls = Arc::clone(&source_calls);
    let second = client
        .query_with_logical_expire(key, Duration::from_secs(60), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<Shop>, RepoError>(Some(shop(7, "不该出现")))
        })
        .await
        .expect("second read");
    assert_eq!(second, Some(shop(7, "旧数据")));

    // 等后台重建完成后读到新值，且总回源次数为 1
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let calls = Arc::clone(&source_calls);
            let value = client
                .query_with_logical_expire(key, Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<Option<Shop>, RepoError>(Some(shop(7, "不该出现")))
                })
                .await
                .expect("poll read");
            if value == Some(shop(7, "新数据")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("rebuilt value never appeared");

    assert_eq!(source_calls.load(Ordering::SeqCst), 1, "only the lock winner rebuilds");
}

#[tokio::test]
async fn test_shop_service_update_invalidates_cache() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let lock = DistributedLock::new(Arc::clone(&kv));
    let cache = CacheClient::new(
        Arc::clone(&kv),
        lock,
        RebuildPool::new(2, 16),
        CacheConfig::default(),
    );
    let store: Arc<dyn ShopStore> = Arc::new(MemoryStore::new());
    store.insert_shop(&shop(1, "开业")).await.unwrap();

    // 互斥策略：读旧、改库删缓存、再读见新
    let service = ShopService::new(
        Arc::clone(&store),
        cache,
        CacheStrategy::Mutex,
        Duration::from_secs(60),
    );

    assert_eq!(
        service.query_by_id(1).await.unwrap(),
        Some(shop(1, "开业"))
    );
    // 缓存里已有条目
    assert!(kv.get(&keys::shop_key(1)).await.unwrap().is_some());

    service.update(&shop(1, "改名")).await.unwrap();
    assert!(kv.get(&keys::shop_key(1)).await.unwrap().is_none());

    assert_eq!(
        service.query_by_id(1).await.unwrap(),
        Some(shop(1, "改名"))
    );
}

#[tokio::test]
async fn test_shop_service_logical_expire_preload_and_read() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let lock = DistributedLock::new(Arc::clone(&kv));
    let cache = CacheClient::new(
        Arc::clone(&kv),
        lock,
        RebuildPool::new(2, 16),
        CacheConfig::default(),
    );
    let store: Arc<dyn ShopStore> = Arc::new(MemoryStore::new());
    store.insert_shop(&shop(3, "热店")).await.unwrap();

    let service = ShopService::new(
        Arc::clone(&store),
        cache,
        CacheStrategy::LogicalExpire,
        Duration::from_secs(60),
    );

    // 未预热的键视为非热键
    assert_eq!(service.query_by_id(3).await.unwrap(), None);

    service.preload(3).await.unwrap();
    assert_eq!(service.query_by_id(3).await.unwrap(), Some(shop(3, "热店")));
}
