//! Batch Context - Value Objects

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::task::TaskStatus;

/// 批量任务聚合进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// 成员进度的算术平均；存在非终态成员时不会达到 100
    pub progress: u8,
}

impl BatchProgress {
    pub fn is_done(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// 单个文件的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub task_id: String,
    pub file_name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// 批量结果，按提交顺序排列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub items: Vec<BatchItemResult>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn is_partial_failure(&self) -> bool {
        self.succeeded() > 0 && self.failed() > 0
    }
}
