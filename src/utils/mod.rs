//! 工具模块 - 时间与日志
//!
//! 时间字段全仓统一 Unix millis (`i64`)，此处是唯一的取当前时间入口。

pub mod logger;

pub use logger::{init_logger, init_logger_with_file};

use chrono::Utc;

/// 当前 Unix millis
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
