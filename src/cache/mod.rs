//! 热点读缓存防护层
//!
//! # 模块结构
//!
//! - [`client`] - 三种读穿策略的缓存客户端
//! - [`entry`] - 逻辑过期信封
//! - [`rebuild`] - 有界后台重建池

pub mod client;
pub mod entry;
pub mod rebuild;

pub use client::{CacheClient, CacheConfig, CacheError, CacheResult};
pub use entry::CacheEntry;
pub use rebuild::RebuildPool;
