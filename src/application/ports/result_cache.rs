//! Result Cache Port - 识别结果缓存
//!
//! 定义结果缓存的抽象接口，具体实现使用 Sled（按时间与数量淘汰）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::task::ProcessingMode;

/// Result Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache storage full: need {needed} bytes, {available} available")]
    StorageFull { needed: u64, available: u64 },

    #[error("Cache write failed after eviction: {0}")]
    WriteFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub task_id: String,
    pub file_name: String,
    pub mode: ProcessingMode,
    pub result: Value,
    pub timestamp: DateTime<Utc>,
    /// 内容指纹（可选），用于提交前查找
    pub fingerprint: Option<String>,
}

/// Result Cache Port
///
/// 以 task_id 为键的有界缓存：
/// - 条目超过最大存活时间视为不存在
/// - 条目数超过上限时按时间从旧到新淘汰
/// - 存储空间不足时淘汰最旧条目后重试一次
#[async_trait]
pub trait ResultCachePort: Send + Sync {
    /// 写入结果
    async fn put(
        &self,
        task_id: &str,
        file_name: &str,
        mode: &ProcessingMode,
        result: Value,
    ) -> Result<(), CacheError>;

    /// 写入结果并登记内容指纹
    async fn put_with_fingerprint(
        &self,
        task_id: &str,
        file_name: &str,
        mode: &ProcessingMode,
        result: Value,
        fingerprint: &str,
    ) -> Result<(), CacheError>;

    /// 读取结果；过期条目被删除并返回 None
    async fn get(&self, task_id: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// 根据内容指纹查找 task_id
    async fn lookup(&self, fingerprint: &str) -> Result<Option<String>, CacheError>;

    /// 删除条目
    async fn remove(&self, task_id: &str) -> Result<(), CacheError>;

    /// 清空本缓存命名空间下的所有数据
    async fn clear(&self) -> Result<(), CacheError>;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// 生成内容指纹
///
/// 使用 md5(file_content) + mode 作为指纹
pub fn content_fingerprint(content: &[u8], mode: &ProcessingMode) -> String {
    let digest = md5::compute(content);
    format!("{:x}:{}", digest, mode)
}
