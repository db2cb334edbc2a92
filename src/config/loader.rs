//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（ocrflow.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["ocrflow", "ocrflow.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `OCRFLOW_`，层级分隔符 `__`）
/// 2. 配置文件（ocrflow.toml 或 ocrflow.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `OCRFLOW_BACKEND__URL=http://ocr-server:8000`
/// - `OCRFLOW_TRACKING__POLL_INTERVAL_MS=500`
/// - `OCRFLOW_EVENTS__URL=ws://ocr-server:8000/ws/logs`
/// - `OCRFLOW_CACHE__DB_PATH=/data/cache.sled`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("backend.url", "http://localhost:8000")?
        .set_default("backend.timeout_secs", 60)?
        .set_default("tracking.poll_interval_ms", 1000)?
        .set_default("batch.max_items", 20)?
        .set_default("events.enabled", true)?
        .set_default("events.url", "ws://localhost:8000/ws/logs")?
        .set_default("events.buffer_capacity", 1000)?
        .set_default("events.initial_delay_ms", 1000)?
        .set_default("events.max_delay_ms", 30_000)?
        .set_default("cache.db_path", "data/cache.sled")?
        .set_default("cache.max_entries", 10)?
        .set_default("cache.max_age_secs", 86400)?
        .set_default("cache.max_size_bytes", 50_u64 * 1024 * 1024)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级），变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("OCRFLOW")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.backend.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Backend URL cannot be empty".to_string(),
        ));
    }

    if config.backend.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Backend timeout cannot be 0".to_string(),
        ));
    }

    if config.tracking.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Poll interval cannot be 0".to_string(),
        ));
    }

    if config.batch.max_items == 0 {
        return Err(ConfigError::ValidationError(
            "Batch max_items cannot be 0".to_string(),
        ));
    }

    if config.events.enabled {
        if config.events.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "Events URL cannot be empty when events are enabled".to_string(),
            ));
        }
        if config.events.buffer_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Event buffer capacity cannot be 0".to_string(),
            ));
        }
        if config.events.initial_delay_ms == 0
            || config.events.max_delay_ms < config.events.initial_delay_ms
        {
            return Err(ConfigError::ValidationError(
                "Reconnect delays must satisfy 0 < initial_delay_ms <= max_delay_ms".to_string(),
            ));
        }
    }

    if config.cache.db_path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Cache path cannot be empty".to_string(),
        ));
    }

    if config.cache.max_entries == 0 || config.cache.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "Cache capacity cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Backend URL: {}", config.backend.url);
    tracing::info!("Backend Timeout: {}s", config.backend.timeout_secs);
    tracing::info!("Poll Interval: {}ms", config.tracking.poll_interval_ms);
    tracing::info!("Batch Max Items: {}", config.batch.max_items);
    tracing::info!("Events Enabled: {}", config.events.enabled);
    if config.events.enabled {
        tracing::info!("Events URL: {}", config.events.url);
        tracing::info!(
            "Reconnect Delay: {}ms..{}ms",
            config.events.initial_delay_ms,
            config.events.max_delay_ms
        );
    }
    tracing::info!("Cache: {}", config.cache.db_path);
    tracing::info!(
        "Cache Limits: {} entries, {}s, {} bytes",
        config.cache.max_entries,
        config.cache.max_age_secs,
        config.cache.max_size_bytes
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_backend_url() {
        let mut config = AppConfig::default();
        config.backend.url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.tracking.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_buffer() {
        let mut config = AppConfig::default();
        config.events.buffer_capacity = 0;
        assert!(validate_config(&config).is_err());

        config.events.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_inverted_delays() {
        let mut config = AppConfig::default();
        config.events.max_delay_ms = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[backend]\nurl = \"http://ocr:9000\"\n\n[cache]\nmax_entries = 3"
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.backend.url, "http://ocr:9000");
        assert_eq!(config.cache.max_entries, 3);
        assert_eq!(config.batch.max_items, 20);
    }
}
