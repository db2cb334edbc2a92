//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod event_transport;
mod recognition_backend;
mod result_cache;

pub use event_transport::{EventFrames, EventTransportError, EventTransportPort};
pub use recognition_backend::{
    BackendError, BatchReceipt, BatchStatusReport, RecognitionBackendPort, TaskReceipt,
    TaskStatusReport,
};
pub use result_cache::{content_fingerprint, CacheEntry, CacheError, CacheStats, ResultCachePort};
