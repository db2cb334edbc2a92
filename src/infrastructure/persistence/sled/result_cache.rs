//! Sled-based Result Cache Implementation
//!
//! 所有键都在 `ocrflow:cache:` 前缀下：
//! - `ocrflow:cache:entry:{task_id}` -> bincode(InternalCacheEntry)
//! - `ocrflow:cache:fingerprint:{fingerprint}` -> task_id

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::Db;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::application::ports::{CacheEntry, CacheError, CacheStats, ResultCachePort};
use crate::domain::task::ProcessingMode;

/// 本缓存的命名空间前缀
pub const CACHE_KEY_PREFIX: &str = "ocrflow:cache:";
const ENTRY_PREFIX: &str = "ocrflow:cache:entry:";
const FINGERPRINT_PREFIX: &str = "ocrflow:cache:fingerprint:";

/// Sled 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: String,
    /// 最大条目数
    pub max_entries: usize,
    /// 条目最大存活时间
    pub max_age: Duration,
    /// 最大存储大小（字节）
    pub max_size_bytes: u64,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "data/cache.sled".to_string(),
            max_entries: 10,
            max_age: Duration::from_secs(24 * 60 * 60),
            max_size_bytes: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 内部缓存条目
///
/// bincode 不支持自描述格式，结果以 JSON 文本保存
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalCacheEntry {
    task_id: String,
    file_name: String,
    mode: String,
    result_json: String,
    fingerprint: Option<String>,
    /// 毫秒时间戳
    created_at: i64,
    /// 写入序号，时间戳相同时按写入顺序淘汰
    sequence: u64,
}

impl InternalCacheEntry {
    fn into_entry(self) -> Result<CacheEntry, CacheError> {
        let result: Value = serde_json::from_str(&self.result_json)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        let mode = ProcessingMode::new(self.mode)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        let timestamp = Utc
            .timestamp_millis_opt(self.created_at)
            .single()
            .ok_or_else(|| {
                CacheError::SerializationError(format!("invalid timestamp {}", self.created_at))
            })?;

        Ok(CacheEntry {
            task_id: self.task_id,
            file_name: self.file_name,
            mode,
            result,
            timestamp,
            fingerprint: self.fingerprint,
        })
    }
}

/// 扫描得到的条目摘要
struct EntryInfo {
    key: Vec<u8>,
    task_id: String,
    fingerprint: Option<String>,
    created_at: i64,
    sequence: u64,
    size_bytes: u64,
}

/// Sled 结果缓存
pub struct SledResultCache {
    db: Db,
    max_entries: usize,
    max_age_ms: i64,
    max_size_bytes: u64,
    current_size: AtomicU64,
    next_sequence: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    /// 所有修改（写入、淘汰、过期删除）串行执行
    write_lock: Mutex<()>,
}

impl SledResultCache {
    /// 创建新的缓存实例
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        let db = sled::open(&config.db_path).map_err(db_error)?;
        let cache = Self::with_db(db, config)?;

        tracing::info!(
            db_path = %config.db_path,
            max_entries = config.max_entries,
            max_age_secs = config.max_age.as_secs(),
            max_size_bytes = config.max_size_bytes,
            current_size = cache.current_size.load(Ordering::Relaxed),
            "SledResultCache initialized"
        );

        Ok(cache)
    }

    /// 在已打开的数据库上创建缓存（数据库可与其他数据共享）
    pub fn with_db(db: Db, config: &SledCacheConfig) -> Result<Self, CacheError> {
        let cache = Self {
            db,
            max_entries: config.max_entries,
            max_age_ms: config.max_age.as_millis() as i64,
            max_size_bytes: config.max_size_bytes,
            current_size: AtomicU64::new(0),
            next_sequence: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        };

        let entries = cache.scan_entries()?;
        let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let next_sequence = entries.iter().map(|e| e.sequence + 1).max().unwrap_or(0);
        cache.current_size.store(total, Ordering::Relaxed);
        cache.next_sequence.store(next_sequence, Ordering::Relaxed);

        Ok(cache)
    }

    /// 打开现有缓存
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let config = SledCacheConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::new(&config)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush().map_err(db_error)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry_key(task_id: &str) -> String {
        format!("{}{}", ENTRY_PREFIX, task_id)
    }

    fn fingerprint_key(fingerprint: &str) -> String {
        format!("{}{}", FINGERPRINT_PREFIX, fingerprint)
    }

    fn is_expired(&self, created_at: i64, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - created_at > self.max_age_ms
    }

    fn scan_entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(ENTRY_PREFIX) {
            let (key, value) = item.map_err(db_error)?;
            match bincode::deserialize::<InternalCacheEntry>(&value) {
                Ok(entry) => entries.push(EntryInfo {
                    key: key.to_vec(),
                    task_id: entry.task_id,
                    fingerprint: entry.fingerprint,
                    created_at: entry.created_at,
                    sequence: entry.sequence,
                    size_bytes: value.len() as u64,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable cache entry");
                    self.db.remove(&key).map_err(db_error)?;
                }
            }
        }
        Ok(entries)
    }

    /// 删除条目及其指纹映射，调用方需持有写锁
    ///
    /// 容量按实际删除的值计算
    fn remove_entry(&self, info: &EntryInfo) -> Result<(), CacheError> {
        if let Some(removed) = self.db.remove(&info.key).map_err(db_error)? {
            let current = self.current_size.load(Ordering::Relaxed);
            self.current_size
                .store(current.saturating_sub(removed.len() as u64), Ordering::Relaxed);
        }

        if let Some(fingerprint) = &info.fingerprint {
            let mapping_key = Self::fingerprint_key(fingerprint);
            // 只删除仍指向本条目的映射
            if let Some(mapped) = self.db.get(&mapping_key).map_err(db_error)? {
                if mapped.as_ref() == info.task_id.as_bytes() {
                    self.db.remove(&mapping_key).map_err(db_error)?;
                }
            }
        }
        Ok(())
    }

    /// 按时间从旧到新淘汰一个条目
    fn evict_oldest(&self) -> Result<bool, CacheError> {
        let oldest = self
            .scan_entries()?
            .into_iter()
            .min_by_key(|e| (e.created_at, e.sequence));

        match oldest {
            Some(info) => {
                self.remove_entry(&info)?;
                tracing::debug!(
                    task_id = %info.task_id,
                    size_bytes = info.size_bytes,
                    "Evicted oldest cache entry"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 写入前检查容量
    fn try_write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let existing = self
            .db
            .get(key)
            .map_err(db_error)?
            .map(|v| v.len() as u64)
            .unwrap_or(0);
        let needed = bytes.len() as u64;
        let current = self.current_size.load(Ordering::Relaxed).saturating_sub(existing);
        let available = self.max_size_bytes.saturating_sub(current);

        if needed > available {
            return Err(CacheError::StorageFull { needed, available });
        }

        self.db.insert(key, bytes).map_err(db_error)?;
        self.current_size.store(current + needed, Ordering::Relaxed);
        Ok(())
    }

    /// 清理：先删除过期条目，再按时间从旧到新删到数量上限以内
    fn cleanup(&self, now: DateTime<Utc>) -> Result<(), CacheError> {
        let mut live = Vec::new();
        let mut expired = 0usize;

        for info in self.scan_entries()? {
            if self.is_expired(info.created_at, now) {
                self.remove_entry(&info)?;
                expired += 1;
            } else {
                live.push(info);
            }
        }

        let mut evicted = 0usize;
        if live.len() > self.max_entries {
            live.sort_by_key(|e| (e.created_at, e.sequence));
            let excess = live.len() - self.max_entries;
            for info in live.iter().take(excess) {
                self.remove_entry(info)?;
                evicted += 1;
            }
        }

        if expired > 0 || evicted > 0 {
            tracing::debug!(expired, evicted, "Cache cleanup finished");
        }
        Ok(())
    }

    /// 以指定时间写入
    pub(crate) fn put_at(
        &self,
        task_id: &str,
        file_name: &str,
        mode: &ProcessingMode,
        result: &Value,
        fingerprint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let result_json =
            serde_json::to_string(result).map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let entry = InternalCacheEntry {
            task_id: task_id.to_string(),
            file_name: file_name.to_string(),
            mode: mode.as_str().to_string(),
            result_json,
            fingerprint: fingerprint.map(str::to_string),
            created_at: now.timestamp_millis(),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };
        let bytes =
            bincode::serialize(&entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;
        let key = Self::entry_key(task_id);

        let _guard = self.lock();

        match self.try_write(&key, &bytes) {
            Err(CacheError::StorageFull { needed, available }) => {
                tracing::warn!(
                    task_id = %task_id,
                    needed,
                    available,
                    "Cache storage full, evicting oldest entry"
                );
                self.evict_oldest()?;
                self.try_write(&key, &bytes)
                    .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            }
            other => other?,
        }

        if let Some(fingerprint) = fingerprint {
            self.db
                .insert(Self::fingerprint_key(fingerprint), task_id.as_bytes())
                .map_err(db_error)?;
        }

        tracing::debug!(
            task_id = %task_id,
            size_bytes = bytes.len(),
            "Result cached"
        );

        self.cleanup(now)
    }

    /// 以指定时间读取
    pub(crate) fn get_at(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = Self::entry_key(task_id);

        let data = match self.db.get(&key).map_err(db_error)? {
            Some(data) => data,
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        let entry: InternalCacheEntry = bincode::deserialize(&data)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        if self.is_expired(entry.created_at, now) {
            return self.expire_on_read(task_id, now);
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        entry.into_entry().map(Some)
    }

    /// 读到过期条目后在写锁内重新读取：期间写入的新条目保留并返回
    fn expire_on_read(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = Self::entry_key(task_id);
        let _guard = self.lock();

        let data = match self.db.get(&key).map_err(db_error)? {
            Some(data) => data,
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };
        let entry: InternalCacheEntry = bincode::deserialize(&data)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        if !self.is_expired(entry.created_at, now) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return entry.into_entry().map(Some);
        }

        self.remove_entry(&EntryInfo {
            key: key.into_bytes(),
            task_id: entry.task_id,
            fingerprint: entry.fingerprint,
            created_at: entry.created_at,
            sequence: entry.sequence,
            size_bytes: data.len() as u64,
        })?;
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(task_id = %task_id, "Expired cache entry removed on read");
        Ok(None)
    }
}

fn db_error(e: sled::Error) -> CacheError {
    CacheError::DatabaseError(e.to_string())
}

#[async_trait]
impl ResultCachePort for SledResultCache {
    async fn put(
        &self,
        task_id: &str,
        file_name: &str,
        mode: &ProcessingMode,
        result: Value,
    ) -> Result<(), CacheError> {
        self.put_at(task_id, file_name, mode, &result, None, Utc::now())
    }

    async fn put_with_fingerprint(
        &self,
        task_id: &str,
        file_name: &str,
        mode: &ProcessingMode,
        result: Value,
        fingerprint: &str,
    ) -> Result<(), CacheError> {
        self.put_at(task_id, file_name, mode, &result, Some(fingerprint), Utc::now())
    }

    async fn get(&self, task_id: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.get_at(task_id, Utc::now())
    }

    async fn lookup(&self, fingerprint: &str) -> Result<Option<String>, CacheError> {
        let mapping_key = Self::fingerprint_key(fingerprint);

        match self.db.get(&mapping_key).map_err(db_error)? {
            Some(data) => {
                let task_id = String::from_utf8(data.to_vec())
                    .map_err(|e| CacheError::SerializationError(e.to_string()))?;
                if self
                    .db
                    .contains_key(Self::entry_key(&task_id))
                    .map_err(db_error)?
                {
                    return Ok(Some(task_id));
                }

                // 加锁后重新确认映射仍指向已不存在的条目
                let _guard = self.lock();
                let still_stale = self.db.get(&mapping_key).map_err(db_error)?.as_deref()
                    == Some(task_id.as_bytes())
                    && !self
                        .db
                        .contains_key(Self::entry_key(&task_id))
                        .map_err(db_error)?;
                if still_stale {
                    self.db.remove(&mapping_key).map_err(db_error)?;
                    return Ok(None);
                }

                match self.db.get(&mapping_key).map_err(db_error)? {
                    Some(current) => String::from_utf8(current.to_vec())
                        .map(Some)
                        .map_err(|e| CacheError::SerializationError(e.to_string())),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, task_id: &str) -> Result<(), CacheError> {
        let key = Self::entry_key(task_id);
        let _guard = self.lock();

        if let Some(data) = self.db.get(&key).map_err(db_error)? {
            let entry: InternalCacheEntry = bincode::deserialize(&data)
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            self.remove_entry(&EntryInfo {
                key: key.into_bytes(),
                task_id: entry.task_id,
                fingerprint: entry.fingerprint,
                created_at: entry.created_at,
                sequence: entry.sequence,
                size_bytes: data.len() as u64,
            })?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock();
        let mut removed = 0usize;

        for item in self.db.scan_prefix(CACHE_KEY_PREFIX) {
            let (key, _) = item.map_err(db_error)?;
            self.db.remove(&key).map_err(db_error)?;
            removed += 1;
        }
        self.current_size.store(0, Ordering::Relaxed);

        tracing::debug!(removed, "Cache cleared");
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let total_entries = self.db.scan_prefix(ENTRY_PREFIX).count();

        CacheStats {
            total_entries,
            total_size_bytes: self.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.max_size_bytes,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use tempfile::tempdir;

    fn config(dir: &tempfile::TempDir) -> SledCacheConfig {
        SledCacheConfig {
            db_path: dir.path().join("test.sled").to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    fn mode() -> ProcessingMode {
        ProcessingMode::new("ocr").unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();

        cache
            .put("task-1", "scan.png", &mode(), json!({ "text": "hello" }))
            .await
            .unwrap();

        let entry = cache.get("task-1").await.unwrap().unwrap();
        assert_eq!(entry.task_id, "task-1");
        assert_eq!(entry.file_name, "scan.png");
        assert_eq!(entry.mode, mode());
        assert_eq!(entry.result, json!({ "text": "hello" }));

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.hit_count, 1);
    }

    #[tokio::test]
    async fn test_eleventh_write_evicts_oldest() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();
        let base = base_time();

        for i in 0..11 {
            let now = base + ChronoDuration::seconds(i);
            cache
                .put_at(&format!("task-{}", i), "p.png", &mode(), &json!(i), None, now)
                .unwrap();
        }

        let read_at = base + ChronoDuration::seconds(30);
        assert_eq!(cache.stats().await.total_entries, 10);
        assert!(cache.get_at("task-0", read_at).unwrap().is_none());
        for i in 1..11 {
            assert!(cache.get_at(&format!("task-{}", i), read_at).unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_same_timestamp_evicts_in_insertion_order() {
        let dir = tempdir().unwrap();
        let config = SledCacheConfig {
            max_entries: 2,
            ..config(&dir)
        };
        let cache = SledResultCache::new(&config).unwrap();
        let now = base_time();

        for id in ["a", "b", "c"] {
            cache.put_at(id, "p.png", &mode(), &json!(id), None, now).unwrap();
        }

        assert!(cache.get_at("a", now).unwrap().is_none());
        assert!(cache.get_at("b", now).unwrap().is_some());
        assert!(cache.get_at("c", now).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();
        let written = base_time();

        cache
            .put_at("task-1", "p.png", &mode(), &json!("r"), None, written)
            .unwrap();

        let almost = written + ChronoDuration::hours(23) + ChronoDuration::minutes(59);
        assert!(cache.get_at("task-1", almost).unwrap().is_some());

        let expired = written + ChronoDuration::hours(24) + ChronoDuration::seconds(1);
        assert!(cache.get_at("task-1", expired).unwrap().is_none());

        // 过期条目在读取时被删除
        assert_eq!(cache.stats().await.total_entries, 0);
        assert_eq!(cache.stats().await.total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_entries_on_write() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();
        let old = base_time();

        cache.put_at("old", "p.png", &mode(), &json!(1), None, old).unwrap();
        let later = old + ChronoDuration::hours(25);
        cache.put_at("new", "p.png", &mode(), &json!(2), None, later).unwrap();

        assert_eq!(cache.stats().await.total_entries, 1);
        assert!(cache.get_at("new", later).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_absent_get_and_repeated_clear_are_noops() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();

        for _ in 0..3 {
            assert!(cache.get("missing").await.unwrap().is_none());
        }
        assert_eq!(cache.stats().await.miss_count, 3);

        cache.put("task-1", "p.png", &mode(), json!(1)).await.unwrap();
        cache.clear().await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.total_entries, 0);
        assert!(cache.get("task-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_leaves_unrelated_keys() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("shared.sled")).unwrap();
        db.insert("settings:theme", "dark").unwrap();

        let cache = SledResultCache::with_db(db.clone(), &config(&dir)).unwrap();
        cache
            .put_with_fingerprint("task-1", "p.png", &mode(), json!(1), "abc:ocr")
            .await
            .unwrap();
        cache.clear().await.unwrap();

        assert!(db.get("settings:theme").unwrap().is_some());
        assert_eq!(db.scan_prefix(CACHE_KEY_PREFIX).count(), 0);
    }

    #[tokio::test]
    async fn test_storage_full_evicts_oldest_then_retries() {
        let dir = tempdir().unwrap();
        let probe = SledResultCache::with_db(
            sled::Config::new().temporary(true).open().unwrap(),
            &config(&dir),
        )
        .unwrap();
        probe
            .put_at("task-1", "p.png", &mode(), &json!("r"), None, base_time())
            .unwrap();
        let entry_size = probe.stats().await.total_size_bytes;

        let limited = SledCacheConfig {
            max_size_bytes: entry_size * 2 + entry_size / 2,
            ..config(&dir)
        };
        let cache = SledResultCache::new(&limited).unwrap();
        let base = base_time();
        for i in 1..=3 {
            cache
                .put_at(
                    &format!("task-{}", i),
                    "p.png",
                    &mode(),
                    &json!("r"),
                    None,
                    base + ChronoDuration::seconds(i),
                )
                .unwrap();
        }

        let read_at = base + ChronoDuration::seconds(10);
        assert!(cache.get_at("task-1", read_at).unwrap().is_none());
        assert!(cache.get_at("task-2", read_at).unwrap().is_some());
        assert!(cache.get_at("task-3", read_at).unwrap().is_some());
        assert!(cache.stats().await.total_size_bytes <= limited.max_size_bytes);

        // 单个条目本身超过容量：淘汰一次后仍然失败
        let huge = json!("x".repeat(entry_size as usize * 4));
        let err = cache
            .put_at("task-4", "p.png", &mode(), &huge, None, read_at)
            .unwrap_err();
        assert!(matches!(err, CacheError::WriteFailed(_)));
        assert!(cache.get_at("task-4", read_at).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_write_survives_expiry_of_stale_read() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();
        let written = base_time();
        let later = written + ChronoDuration::hours(25);

        cache
            .put_at("task-1", "p.png", &mode(), &json!("old"), None, written)
            .unwrap();
        // 读取方已看到过期的旧值，随后另一方写入新值
        cache
            .put_at("task-1", "p.png", &mode(), &json!("new"), None, later)
            .unwrap();
        let entry = cache.expire_on_read("task-1", later).unwrap().unwrap();

        assert_eq!(entry.result, json!("new"));
        assert!(cache.get_at("task-1", later).unwrap().is_some());
        assert_eq!(cache.stats().await.total_entries, 1);
        assert!(cache.stats().await.total_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_remove_uses_stored_size() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();
        let now = base_time();

        cache.put_at("task-1", "p.png", &mode(), &json!("a"), None, now).unwrap();
        let stale = cache.scan_entries().unwrap().remove(0);
        cache
            .put_at("task-1", "p.png", &mode(), &json!("a".repeat(500)), None, now)
            .unwrap();

        {
            let _guard = cache.lock();
            cache.remove_entry(&stale).unwrap();
        }
        assert_eq!(cache.stats().await.total_size_bytes, 0);
        assert_eq!(cache.stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn test_lookup_keeps_remapped_fingerprint() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();

        cache
            .put_with_fingerprint("task-1", "p.png", &mode(), json!(1), "abc:ocr")
            .await
            .unwrap();
        cache
            .put_with_fingerprint("task-2", "p.png", &mode(), json!(2), "abc:ocr")
            .await
            .unwrap();
        cache.remove("task-1").await.unwrap();

        assert_eq!(
            cache.lookup("abc:ocr").await.unwrap(),
            Some("task-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_fingerprint_lookup() {
        let dir = tempdir().unwrap();
        let cache = SledResultCache::new(&config(&dir)).unwrap();

        cache
            .put_with_fingerprint("task-7", "p.png", &mode(), json!(1), "abc:ocr")
            .await
            .unwrap();
        assert_eq!(
            cache.lookup("abc:ocr").await.unwrap(),
            Some("task-7".to_string())
        );

        cache.remove("task-7").await.unwrap();
        assert_eq!(cache.lookup("abc:ocr").await.unwrap(), None);
        assert!(cache.get("task-7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_restores_size() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        {
            let cache = SledResultCache::new(&config).unwrap();
            cache.put("task-1", "p.png", &mode(), json!(1)).await.unwrap();
            cache.flush().unwrap();
        }

        let cache = SledResultCache::new(&config).unwrap();
        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert!(stats.total_size_bytes > 0);
        assert!(cache.get("task-1").await.unwrap().is_some());
    }
}
