//! 缓存重建工作池
//!
//! 固定数量的 tokio 任务消费一条有界通道里的重建作业。
//! 提交是 `try_send`：池满时放弃重建 (旧值继续对外服务)，
//! 绝不把背压传导回读路径。

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};

type RebuildJob = BoxFuture<'static, ()>;

/// 有界后台重建池
///
/// Drop 掉所有克隆后通道关闭，worker 自行退出。
#[derive(Clone)]
pub struct RebuildPool {
    tx: mpsc::Sender<RebuildJob>,
}

impl RebuildPool {
    /// 启动 `workers` 个消费任务，队列容量 `capacity`
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RebuildJob>(capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    // 先取作业再放锁，作业执行不持锁
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                tracing::debug!(worker_id, "cache rebuild worker stopped");
            });
        }

        Self { tx }
    }

    /// 尝试提交一个重建作业；池满返回 `false`，作业被丢弃
    pub fn try_submit(&self, job: impl Future<Output = ()> + Send + 'static) -> bool {
        self.tx.try_send(Box::pin(job)).is_ok()
    }
}

impl std::fmt::Debug for RebuildPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildPool").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_submitted_jobs_run() {
        let pool = RebuildPool::new(2, 8);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            assert!(pool.try_submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < 5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not finish in time");
    }

    #[tokio::test]
    async fn test_full_pool_rejects_without_blocking() {
        // 单 worker 被一个长作业占住，队列容量 1
        let pool = RebuildPool::new(1, 1);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        assert!(pool.try_submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        }));
        // 等 worker 取走第一个作业
        started_rx.await.expect("first job never started");

        // 队列占满后第三个提交立即失败
        assert!(pool.try_submit(async {}));
        assert!(!pool.try_submit(async {}));

        let _ = release_tx.send(());
    }
}
