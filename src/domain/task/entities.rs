//! Task Context - Entities

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProgressPhase, TaskStatus};

/// 后端声称完成却没有结果时使用的错误信息
const MISSING_RESULT_ERROR: &str = "backend reported completion without a result";

/// 后端报告失败但未给出原因时使用的错误信息
const UNKNOWN_FAILURE_ERROR: &str = "task failed";

/// 任务快照
///
/// 由 TaskTracker 发出的某一时刻的任务视图。构造时规范化，保证：
/// - completed ⇔ result 存在且 error 为空
/// - failed ⇔ error 存在且 result 为空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl TaskSnapshot {
    /// 从后端报告的原始状态构造快照
    pub fn normalize(
        task_id: impl Into<String>,
        status: TaskStatus,
        progress: u8,
        error: Option<String>,
        result: Option<Value>,
    ) -> Self {
        let task_id = task_id.into();
        let progress = progress.min(100);

        match status {
            TaskStatus::Completed => match result {
                Some(result) => Self {
                    task_id,
                    status,
                    progress: 100,
                    error: None,
                    result: Some(result),
                },
                None => Self::failed(task_id, progress, MISSING_RESULT_ERROR),
            },
            TaskStatus::Failed => {
                let error = error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_FAILURE_ERROR.to_string());
                Self::failed(task_id, progress, error)
            }
            _ => Self {
                task_id,
                status,
                progress,
                error: None,
                result: None,
            },
        }
    }

    /// 构造失败快照
    pub fn failed(task_id: impl Into<String>, progress: u8, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            progress: progress.min(100),
            error: Some(error.into()),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn phase(&self) -> ProgressPhase {
        ProgressPhase::from_progress(self.progress)
    }
}

/// 识别任务
///
/// 只通过 [`Task::apply`] 由轮询快照驱动变更
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub result: Option<Value>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            progress: 0,
            error: None,
            result: None,
        }
    }

    /// 应用快照；终态之后的快照被忽略
    pub fn apply(&mut self, snapshot: &TaskSnapshot) {
        if self.status.is_terminal() {
            tracing::debug!(
                task_id = %self.id,
                status = %self.status,
                "Ignoring snapshot for terminal task"
            );
            return;
        }
        self.status = snapshot.status;
        self.progress = snapshot.progress;
        self.error = snapshot.error.clone();
        self.result = snapshot.result.clone();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_invariant(snapshot: &TaskSnapshot) {
        let completed = snapshot.status == TaskStatus::Completed;
        let failed = snapshot.status == TaskStatus::Failed;
        assert_eq!(completed, snapshot.result.is_some() && snapshot.error.is_none());
        assert_eq!(failed, snapshot.error.is_some() && snapshot.result.is_none());
    }

    #[test]
    fn test_normalize_keeps_invariant() {
        let cases = vec![
            (TaskStatus::Pending, Some("stale".to_string()), Some(json!(1))),
            (TaskStatus::Processing, None, Some(json!({"partial": true}))),
            (TaskStatus::Completed, Some("ignored".to_string()), Some(json!({"text": "hi"}))),
            (TaskStatus::Completed, None, None),
            (TaskStatus::Failed, None, Some(json!(1))),
            (TaskStatus::Failed, Some("bad scan".to_string()), None),
        ];

        for (status, error, result) in cases {
            let snapshot = TaskSnapshot::normalize("t-1", status, 50, error, result);
            assert_invariant(&snapshot);
        }
    }

    #[test]
    fn test_completed_without_result_becomes_failed() {
        let snapshot = TaskSnapshot::normalize("t-1", TaskStatus::Completed, 100, None, None);
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some(MISSING_RESULT_ERROR));
    }

    #[test]
    fn test_completed_forces_full_progress() {
        let snapshot =
            TaskSnapshot::normalize("t-1", TaskStatus::Completed, 70, None, Some(json!("ok")));
        assert_eq!(snapshot.progress, 100);
    }

    #[test]
    fn test_progress_clamped() {
        let snapshot = TaskSnapshot::normalize("t-1", TaskStatus::Processing, 250, None, None);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.phase(), ProgressPhase::PostProcessing);
    }

    #[test]
    fn test_task_ignores_updates_after_terminal() {
        let mut task = Task::new("t-1");
        task.apply(&TaskSnapshot::failed("t-1", 40, "boom"));
        assert!(task.is_terminal());

        task.apply(&TaskSnapshot::normalize(
            "t-1",
            TaskStatus::Processing,
            60,
            None,
            None,
        ));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }
}
