//! 基于 tracing_subscriber 的日志初始化。

use std::io::IsTerminal;
use std::sync::Once;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// 日志级别的环境变量，语法同 RUST_LOG
pub const LOG_ENV_VAR: &str = "TRANSIT_LOG";

/// 初始化全局日志，可重复调用（测试中也会调用）
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .with_env_var(LOG_ENV_VAR)
            .from_env_lossy();

        // 已有全局 subscriber 时忽略
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .try_init();
    });
}
