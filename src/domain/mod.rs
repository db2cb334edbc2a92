//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Task Context: 单个识别任务（状态、进度、快照）
//! - Batch Context: 批量任务聚合（成员、聚合进度、结果）

pub mod batch;
pub mod task;
