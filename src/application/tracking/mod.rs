//! Tracking - 任务与批量跟踪
//!
//! - TaskTracker: 轮询单个任务直到终态，输出快照流
//! - BatchCoordinator: 批量提交、并发跟踪成员、聚合进度

mod batch_coordinator;
mod task_tracker;

pub use batch_coordinator::{BatchCoordinator, BatchCoordinatorConfig, BatchSubmission};
pub use task_tracker::{TaskSnapshotStream, TaskTracker, TaskTrackerConfig};
