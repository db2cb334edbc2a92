//! Fake Recognition Backend - 用于测试和演示的脚本化后端
//!
//! 不发起任何网络请求。每个任务按预设脚本依次返回状态，
//! 脚本只剩最后一步时重复返回该步。任务与批量 id 按提交顺序分配：
//! `task-1`, `task-2`, ... 与 `batch-1`, `batch-2`, ...

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::application::ports::{
    BackendError, BatchReceipt, BatchStatusReport, RecognitionBackendPort, TaskReceipt,
    TaskStatusReport,
};
use crate::domain::task::{ProcessingMode, TaskStatus, UploadFile};

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum FakeStep {
    Report {
        status: TaskStatus,
        progress: u8,
        error: Option<String>,
        result: Option<Value>,
    },
    NetworkError(String),
}

impl FakeStep {
    pub fn processing(progress: u8) -> Self {
        FakeStep::Report {
            status: TaskStatus::Processing,
            progress,
            error: None,
            result: None,
        }
    }

    pub fn completed(result: Value) -> Self {
        FakeStep::Report {
            status: TaskStatus::Completed,
            progress: 100,
            error: None,
            result: Some(result),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        FakeStep::Report {
            status: TaskStatus::Failed,
            progress: 0,
            error: Some(error.into()),
            result: None,
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        FakeStep::NetworkError(message.into())
    }

    fn to_report(&self, task_id: &str, file_name: Option<String>) -> Result<TaskStatusReport, BackendError> {
        match self {
            FakeStep::Report {
                status,
                progress,
                error,
                result,
            } => Ok(TaskStatusReport {
                task_id: task_id.to_string(),
                file_name,
                status: *status,
                progress: *progress,
                error: error.clone(),
                result: result.clone(),
            }),
            FakeStep::NetworkError(message) => Err(BackendError::NetworkError(message.clone())),
        }
    }
}

/// 脚本化识别后端
pub struct FakeRecognitionBackend {
    /// task_id -> 剩余脚本
    scripts: DashMap<String, VecDeque<FakeStep>>,
    /// task_id -> 最近一次返回的步骤
    served: DashMap<String, FakeStep>,
    /// task_id -> file_name
    task_files: DashMap<String, String>,
    /// batch_id -> 成员 task_id（按提交顺序）
    batches: DashMap<String, Vec<String>>,
    status_calls: DashMap<String, usize>,
    results_calls: DashMap<String, usize>,
    submit_calls: AtomicUsize,
    next_task: AtomicU64,
    next_batch: AtomicU64,
    max_batch_items: usize,
}

impl FakeRecognitionBackend {
    pub fn new() -> Self {
        Self {
            scripts: DashMap::new(),
            served: DashMap::new(),
            task_files: DashMap::new(),
            batches: DashMap::new(),
            status_calls: DashMap::new(),
            results_calls: DashMap::new(),
            submit_calls: AtomicUsize::new(0),
            next_task: AtomicU64::new(1),
            next_batch: AtomicU64::new(1),
            max_batch_items: 20,
        }
    }

    /// 设置后端侧的批量上限
    pub fn with_max_batch_items(mut self, max: usize) -> Self {
        self.max_batch_items = max;
        self
    }

    /// 为任务设置状态脚本
    pub fn script_task(&self, task_id: &str, steps: Vec<FakeStep>) {
        self.scripts.insert(task_id.to_string(), steps.into());
    }

    pub fn status_calls(&self, task_id: &str) -> usize {
        self.status_calls.get(task_id).map(|c| *c).unwrap_or(0)
    }

    pub fn results_calls(&self, batch_id: &str) -> usize {
        self.results_calls.get(batch_id).map(|c| *c).unwrap_or(0)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn assign_task(&self, file_name: &str) -> String {
        let task_id = format!("task-{}", self.next_task.fetch_add(1, Ordering::SeqCst));
        self.task_files.insert(task_id.clone(), file_name.to_string());
        task_id
    }

    fn next_step(&self, task_id: &str) -> Option<FakeStep> {
        let mut script = self.scripts.get_mut(task_id)?;
        let step = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }?;
        self.served.insert(task_id.to_string(), step.clone());
        Some(step)
    }

    /// 当前状态（不推进脚本）
    fn current_report(&self, task_id: &str) -> Option<TaskStatusReport> {
        let step = match self.served.get(task_id) {
            Some(step) => step.clone(),
            None => self.scripts.get(task_id)?.front().cloned()?,
        };
        let file_name = self.task_files.get(task_id).map(|f| f.clone());
        step.to_report(task_id, file_name).ok()
    }
}

impl Default for FakeRecognitionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognitionBackendPort for FakeRecognitionBackend {
    async fn submit_task(
        &self,
        file: &UploadFile,
        mode: &ProcessingMode,
    ) -> Result<TaskReceipt, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let task_id = self.assign_task(&file.file_name);

        tracing::debug!(
            task_id = %task_id,
            file_name = %file.file_name,
            mode = %mode,
            "FakeRecognitionBackend: task accepted"
        );

        Ok(TaskReceipt { task_id })
    }

    async fn submit_batch(
        &self,
        files: &[UploadFile],
        mode: &ProcessingMode,
    ) -> Result<BatchReceipt, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        if files.len() > self.max_batch_items {
            return Err(BackendError::Rejected {
                status: 413,
                message: format!("at most {} files per batch", self.max_batch_items),
            });
        }

        let batch_id = format!("batch-{}", self.next_batch.fetch_add(1, Ordering::SeqCst));
        let task_ids: Vec<String> = files.iter().map(|f| self.assign_task(&f.file_name)).collect();
        self.batches.insert(batch_id.clone(), task_ids.clone());

        tracing::debug!(
            batch_id = %batch_id,
            files = files.len(),
            mode = %mode,
            "FakeRecognitionBackend: batch accepted"
        );

        Ok(BatchReceipt { batch_id, task_ids })
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusReport, BackendError> {
        *self.status_calls.entry(task_id.to_string()).or_insert(0) += 1;

        let step = self
            .next_step(task_id)
            .ok_or_else(|| BackendError::NotFound(task_id.to_string()))?;
        step.to_report(task_id, None)
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatusReport, BackendError> {
        let task_ids = self
            .batches
            .get(batch_id)
            .map(|b| b.clone())
            .ok_or_else(|| BackendError::NotFound(batch_id.to_string()))?;

        let tasks: Vec<TaskStatusReport> = task_ids
            .iter()
            .map(|id| {
                self.current_report(id).unwrap_or(TaskStatusReport {
                    task_id: id.clone(),
                    file_name: self.task_files.get(id).map(|f| f.clone()),
                    status: TaskStatus::Pending,
                    progress: 0,
                    error: None,
                    result: None,
                })
            })
            .collect();

        let progress = if tasks.is_empty() {
            0
        } else {
            (tasks.iter().map(|t| t.progress as usize).sum::<usize>() / tasks.len()) as u8
        };

        Ok(BatchStatusReport {
            batch_id: batch_id.to_string(),
            progress,
            tasks,
        })
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<TaskStatusReport>, BackendError> {
        *self.results_calls.entry(batch_id.to_string()).or_insert(0) += 1;

        let task_ids = self
            .batches
            .get(batch_id)
            .map(|b| b.clone())
            .ok_or_else(|| BackendError::NotFound(batch_id.to_string()))?;

        Ok(task_ids
            .iter()
            .filter_map(|id| self.current_report(id))
            .collect())
    }
}
