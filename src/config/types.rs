//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::tracking::{BatchCoordinatorConfig, TaskTrackerConfig};
use crate::infrastructure::adapters::HttpRecognitionClientConfig;
use crate::infrastructure::events::EventStreamConfig;
use crate::infrastructure::persistence::SledCacheConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 识别后端配置
    #[serde(default)]
    pub backend: BackendConfig,

    /// 任务轮询配置
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// 批量配置
    #[serde(default)]
    pub batch: BatchConfig,

    /// 事件通道配置
    #[serde(default)]
    pub events: EventsConfig,

    /// 结果缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 识别后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// 识别服务基础 URL
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_backend_timeout() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn client_config(&self) -> HttpRecognitionClientConfig {
        HttpRecognitionClientConfig::new(&self.url).with_timeout(self.timeout_secs)
    }
}

/// 任务轮询配置
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// 轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl TrackingConfig {
    pub fn tracker_config(&self) -> TaskTrackerConfig {
        TaskTrackerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// 批量配置
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// 单个批量最多文件数
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_max_items() -> usize {
    20
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
        }
    }
}

impl BatchConfig {
    pub fn coordinator_config(&self) -> BatchCoordinatorConfig {
        BatchCoordinatorConfig {
            max_items: self.max_items,
        }
    }
}

/// 事件通道配置
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// 是否连接事件通道
    #[serde(default = "default_events_enabled")]
    pub enabled: bool,

    /// WebSocket 地址
    #[serde(default = "default_events_url")]
    pub url: String,

    /// 本地保留的最大事件数
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// 首次重连延迟（毫秒）
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// 重连延迟上限（毫秒）
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_events_enabled() -> bool {
    true
}

fn default_events_url() -> String {
    "ws://localhost:8000/ws/logs".to_string()
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: default_events_enabled(),
            url: default_events_url(),
            buffer_capacity: default_buffer_capacity(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl EventsConfig {
    pub fn stream_config(&self) -> EventStreamConfig {
        EventStreamConfig {
            buffer_capacity: self.buffer_capacity,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// 结果缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Sled 数据库路径
    #[serde(default = "default_cache_path")]
    pub db_path: String,

    /// 最大条目数
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// 条目最大存活时间（秒）
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// 最大存储大小（字节）
    #[serde(default = "default_max_size")]
    pub max_size_bytes: u64,
}

fn default_cache_path() -> String {
    "data/cache.sled".to_string()
}

fn default_max_entries() -> usize {
    10
}

fn default_max_age() -> u64 {
    86400 // 24 小时
}

fn default_max_size() -> u64 {
    50 * 1024 * 1024 // 50 MB
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_cache_path(),
            max_entries: default_max_entries(),
            max_age_secs: default_max_age(),
            max_size_bytes: default_max_size(),
        }
    }
}

impl CacheConfig {
    pub fn sled_config(&self) -> SledCacheConfig {
        SledCacheConfig {
            db_path: self.db_path.clone(),
            max_entries: self.max_entries,
            max_age: Duration::from_secs(self.max_age_secs),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backend.url, "http://localhost:8000");
        assert_eq!(config.tracking.poll_interval_ms, 1000);
        assert_eq!(config.batch.max_items, 20);
        assert_eq!(config.events.buffer_capacity, 1000);
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.cache.max_age_secs, 86400);
    }

    #[test]
    fn test_component_configs() {
        let config = AppConfig::default();
        assert_eq!(config.tracking.tracker_config().poll_interval, Duration::from_secs(1));
        assert_eq!(config.events.stream_config().max_delay, Duration::from_secs(30));
        assert_eq!(
            config.cache.sled_config().max_age,
            Duration::from_secs(24 * 60 * 60)
        );
        assert_eq!(config.backend.client_config().timeout_secs, 60);
    }
}
