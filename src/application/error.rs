//! 应用层错误定义
//!
//! 统一的编排层错误类型

use thiserror::Error;

use crate::application::ports::{BackendError, CacheError};
use crate::domain::task::TaskDomainError;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 请求失败或通道关闭（可重试）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 后端拒绝（例如批量超过上限），不会自动重试
    #[error("Backend rejection: {0}")]
    BackendRejection(String),

    /// 后端报告任务失败
    #[error("Task {task_id} failed: {message}")]
    TaskFailure { task_id: String, message: String },

    /// 淘汰重试后仍然写入失败（非致命）
    #[error("Cache write failure: {0}")]
    CacheWriteFailure(String),

    /// 调用方取消
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 输入无效
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建拒绝错误
    pub fn rejection(message: impl Into<String>) -> Self {
        Self::BackendRejection(message.into())
    }

    /// 创建取消错误
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<BackendError> for ApplicationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Rejected { .. } => Self::BackendRejection(err.to_string()),
            BackendError::NotFound(id) => Self::not_found("Remote resource", id),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<CacheError> for ApplicationError {
    fn from(err: CacheError) -> Self {
        Self::CacheWriteFailure(err.to_string())
    }
}

impl From<TaskDomainError> for ApplicationError {
    fn from(err: TaskDomainError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
