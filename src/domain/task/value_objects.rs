//! Task Context - Value Objects

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::TaskDomainError;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待处理
    Pending,
    /// 正在上传
    Uploading,
    /// 正在识别
    Processing,
    /// 识别完成
    Completed,
    /// 识别失败
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "uploading" => Some(TaskStatus::Uploading),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// 终态：completed 或 failed，之后不再变化
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 进度阶段（仅用于展示的标签，不参与状态判断）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// progress < 30
    Ingesting,
    /// 30 <= progress < 80
    Recognizing,
    /// progress >= 80
    PostProcessing,
}

impl ProgressPhase {
    pub fn from_progress(progress: u8) -> Self {
        match progress {
            0..=29 => ProgressPhase::Ingesting,
            30..=79 => ProgressPhase::Recognizing,
            _ => ProgressPhase::PostProcessing,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressPhase::Ingesting => "ingesting",
            ProgressPhase::Recognizing => "recognition in progress",
            ProgressPhase::PostProcessing => "post-processing",
        }
    }
}

/// 处理模式（后端的处理配置标签，对客户端不透明）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingMode(String);

impl ProcessingMode {
    pub fn new(mode: impl Into<String>) -> Result<Self, TaskDomainError> {
        let mode = mode.into();
        if mode.trim().is_empty() {
            return Err(TaskDomainError::InvalidMode(mode));
        }
        Ok(Self(mode))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 待上传的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }

    /// 从磁盘读取文件
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TaskDomainError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| TaskDomainError::InvalidFile(path.display().to_string()))?;

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| TaskDomainError::FileReadError(format!("{}: {}", path.display(), e)))?;

        if content.is_empty() {
            return Err(TaskDomainError::InvalidFile(format!(
                "{}: file is empty",
                path.display()
            )));
        }

        Ok(Self { file_name, content })
    }

    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}
