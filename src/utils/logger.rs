//! 日志初始化
//!
//! tracing 结构化日志：默认 stdout；给出日志目录时切换为
//! 按天滚动的文件输出 (排障与对账都依赖落库丢弃路径的日志)。

use std::path::Path;

/// 以默认级别 (info) 初始化 stdout 日志
pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// 初始化日志，可选指定级别与文件输出目录
///
/// `log_dir` 存在时写 `{log_dir}/seckill-engine.YYYY-MM-DD`，
/// 否则输出到 stdout。重复初始化会 panic，只在进程入口调用一次。
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level.parse().unwrap_or(tracing::Level::INFO))
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.exists()
            && let Some(dir_str) = log_path.to_str()
        {
            let file_appender = tracing_appender::rolling::daily(dir_str, "seckill-engine");
            subscriber.with_writer(file_appender).init();
            return;
        }
        // 目录不存在时静默退回 stdout
    }

    subscriber.init();
}
