//! Sled 存储实现

mod result_cache;

pub use result_cache::{SledCacheConfig, SledResultCache, CACHE_KEY_PREFIX};
