//! 核心模块 - 引擎配置、状态和指标
//!
//! # 模块结构
//!
//! - [`Config`] - 引擎配置
//! - [`EngineState`] - 引擎状态与对象图组装
//! - [`SeckillMetrics`] - 指标计数器

pub mod config;
pub mod metrics;
pub mod state;

pub use config::Config;
pub use metrics::{MetricsSnapshot, SeckillMetrics};
pub use state::EngineState;
