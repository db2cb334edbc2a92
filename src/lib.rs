//! Ocrflow - 异步文档识别编排
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Task Context: 任务状态、快照规范化
//! - Batch Context: 批量成员、进度聚合、结果汇总
//!
//! 应用层 (application/):
//! - Ports: 端口定义（RecognitionBackend, ResultCache, EventTransport）
//! - Tracking: TaskTracker, BatchCoordinator
//! - Commands: RecognizeFile 命令处理器
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: HTTP 识别客户端, WebSocket 事件通道, 脚本化后端
//! - Events: 带重连的日志事件流
//! - Persistence: Sled 结果缓存

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
