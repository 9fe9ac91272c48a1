//! 日志系统初始化.
//!
//! 控制台 + 可选的按日滚动文件输出. 库内部各 crate 统一使用 `log`
//! 门面打点, 由 tracing-subscriber 收敛.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 过滤表达式, 如 "info" 或 "sheng_format=debug"
    pub level: String,
    /// 日志文件目录; None 表示只输出控制台
    #[serde(default)]
    pub directory: Option<String>,
    /// 日志文件名前缀
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "sheng".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志系统. 重复调用返回错误.
pub fn init(config: LoggingConfig) -> Result<()> {
    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_filter(EnvFilter::new(&config.level));

    let file_layer = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();
            Some(
                fmt::Layer::default()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_filter(EnvFilter::new(&config.level)),
            )
        }
        None => None,
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_默认配置() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.directory.is_none());
        assert_eq!(config.file_prefix, "sheng");
    }

    #[test]
    fn test_配置反序列化() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","directory":"/tmp/logs"}"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.directory.as_deref(), Some("/tmp/logs"));
    }
}
