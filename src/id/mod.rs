//! 分布式 ID 生成器
//!
//! 订单号 = `(当前秒 - 自定义纪元) << 32 | 当日序列号`。
//! 序列号来自共享存储上 `icr:{scope}:{yyyy:MM:dd}` 键的原子自增，
//! 按天滚动，跨进程安全。
//!
//! 存储不可达时立即失败 — 去重系统在失败不明时绝不能补发第二个 id。

use std::sync::Arc;

use chrono::Utc;

use crate::kv::{keys, KvResult, KvStore};

/// 序列号占用的低位位数
const SEQUENCE_BITS: u32 = 32;

/// 默认纪元: 2022-01-01T00:00:00Z
pub const DEFAULT_EPOCH_SECS: i64 = 1_640_995_200;

/// 基于共享序列的 ID 生成器
///
/// 同一 scope 内的 id 在实际吞吐下单调不减；
/// 唯一性由存储侧串行化的自增保证。
#[derive(Clone)]
pub struct IdGenerator {
    kv: Arc<dyn KvStore>,
    epoch_secs: i64,
}

impl IdGenerator {
    pub fn new(kv: Arc<dyn KvStore>, epoch_secs: i64) -> Self {
        Self { kv, epoch_secs }
    }

    /// 生成下一个 id
    ///
    /// `scope` 区分业务键空间 (如 `"order"`)，互不影响。
    pub async fn next_id(&self, scope: &str) -> KvResult<i64> {
        let now = Utc::now();
        let timestamp = now.timestamp() - self.epoch_secs;
        let date = now.format("%Y:%m:%d").to_string();

        // 自增失败直接上抛，不重试
        let sequence = self.kv.incr(&keys::sequence_key(scope, &date)).await?;

        Ok((timestamp << SEQUENCE_BITS) | (sequence & ((1 << SEQUENCE_BITS) - 1)))
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("epoch_secs", &self.epoch_secs)
            .finish_non_exhaustive()
    }
}
