//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（RecognitionBackend、ResultCache、EventTransport）
//! - tracking: 任务轮询与批量协调
//! - commands: 命令及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod tracking;

// Re-exports
pub use commands::{handlers::RecognizeFileHandler, RecognitionOutcome, RecognizeFileCommand};

pub use error::ApplicationError;

pub use ports::{
    content_fingerprint, BackendError, BatchReceipt, BatchStatusReport, CacheEntry, CacheError,
    CacheStats, EventFrames, EventTransportError, EventTransportPort, RecognitionBackendPort,
    ResultCachePort, TaskReceipt, TaskStatusReport,
};

pub use tracking::{
    BatchCoordinator, BatchCoordinatorConfig, BatchSubmission, TaskSnapshotStream, TaskTracker,
    TaskTrackerConfig,
};
