//! Task Context - Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskDomainError {
    #[error("无效的处理模式: {0:?}")]
    InvalidMode(String),

    #[error("无效的文件: {0}")]
    InvalidFile(String),

    #[error("文件读取错误: {0}")]
    FileReadError(String),
}
