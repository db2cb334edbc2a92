//! Batch Context - 批量任务限界上下文
//!
//! 职责:
//! - 批量任务聚合（成员顺序、聚合进度）
//! - 批量结果（逐项状态）

mod aggregate;
mod value_objects;

pub use aggregate::{BatchJob, BatchMember};
pub use value_objects::{BatchItemResult, BatchProgress, BatchResult};
