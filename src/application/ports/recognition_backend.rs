//! Recognition Backend Port - 远程识别执行后端
//!
//! 定义提交、状态查询、结果获取的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::task::{ProcessingMode, TaskSnapshot, TaskStatus, UploadFile};

/// 识别后端错误
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Backend rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl BackendError {
    /// 传输层错误（可通过重试恢复）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BackendError::NetworkError(_)
                | BackendError::Timeout
                | BackendError::ServiceError(_)
                | BackendError::InvalidResponse(_)
        )
    }
}

/// 单任务提交回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: String,
}

/// 批量提交回执，task_ids 与提交顺序一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub task_ids: Vec<String>,
}

/// 后端报告的任务状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub task_id: String,
    /// 批量状态中的成员可能带有文件名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl TaskStatusReport {
    /// 规范化为快照
    pub fn into_snapshot(self) -> TaskSnapshot {
        TaskSnapshot::normalize(
            self.task_id,
            self.status,
            self.progress,
            self.error,
            self.result,
        )
    }
}

/// 后端报告的批量状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatusReport {
    pub batch_id: String,
    /// 后端给出的聚合进度，仅供参考
    #[serde(default)]
    pub progress: u8,
    pub tasks: Vec<TaskStatusReport>,
}

/// Recognition Backend Port
///
/// 外部识别服务的抽象接口
#[async_trait]
pub trait RecognitionBackendPort: Send + Sync {
    /// 提交单个文件
    async fn submit_task(
        &self,
        file: &UploadFile,
        mode: &ProcessingMode,
    ) -> Result<TaskReceipt, BackendError>;

    /// 以一个 multipart 请求提交多个文件
    async fn submit_batch(
        &self,
        files: &[UploadFile],
        mode: &ProcessingMode,
    ) -> Result<BatchReceipt, BackendError>;

    /// 查询任务状态
    async fn task_status(&self, task_id: &str) -> Result<TaskStatusReport, BackendError>;

    /// 查询批量状态
    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatusReport, BackendError>;

    /// 获取批量结果（全部成员终态后调用）
    async fn batch_results(&self, batch_id: &str) -> Result<Vec<TaskStatusReport>, BackendError>;

    /// 检查后端是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
