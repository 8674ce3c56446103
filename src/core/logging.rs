//! 日志初始化

use crate::config::{LogLevel, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅者
///
/// `RUST_LOG` 优先，否则使用配置中的级别。重复调用无副作用。
pub fn init_logging(config: &LoggingConfig) {
    if !config.log_to_console {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
    {
        tracing::debug!(target: "sensehat", "Logging initialized at {:?}", config.level);
    }
}

impl LogLevel {
    /// `EnvFilter` 指令字符串
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn test_filter_names() {
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }
}
