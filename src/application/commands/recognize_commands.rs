//! Recognition Commands - 单文件识别命令

use serde::Serialize;
use serde_json::Value;

use crate::domain::task::{ProcessingMode, TaskStatus, UploadFile};

/// 识别单个文件命令
#[derive(Debug, Clone)]
pub struct RecognizeFileCommand {
    pub file: UploadFile,
    pub mode: ProcessingMode,
}

/// 识别结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionOutcome {
    pub task_id: String,
    pub file_name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 结果来自本地缓存，未访问后端
    pub from_cache: bool,
}
