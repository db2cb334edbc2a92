//! Task Context - 识别任务限界上下文
//!
//! 职责:
//! - 任务状态与进度的值对象
//! - 后端状态报告到快照的规范化
//! - 任务实体（仅由快照驱动变更）

mod entities;
mod errors;
mod value_objects;

pub use entities::{Task, TaskSnapshot};
pub use errors::TaskDomainError;
pub use value_objects::{ProcessingMode, ProgressPhase, TaskStatus, UploadFile};
