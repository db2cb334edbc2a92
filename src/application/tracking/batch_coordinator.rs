//! Batch Coordinator - 批量提交与聚合
//!
//! 每个成员任务对应一个 TaskTracker，快照流合并后由本协调器更新聚合进度。
//! 只有全部成员到达终态才会获取结果；批量结束、取消或被放弃时所有成员轮询都会停止。

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::application::error::ApplicationError;
use crate::application::ports::RecognitionBackendPort;
use crate::domain::batch::{BatchJob, BatchMember, BatchProgress, BatchResult};
use crate::domain::task::{ProcessingMode, UploadFile};

use super::TaskTracker;

/// 协调器配置
#[derive(Debug, Clone)]
pub struct BatchCoordinatorConfig {
    /// 单个批量允许的最大文件数
    pub max_items: usize,
}

impl Default for BatchCoordinatorConfig {
    fn default() -> Self {
        Self { max_items: 20 }
    }
}

/// 批量提交结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSubmission {
    pub batch_id: String,
    pub task_ids: Vec<String>,
}

/// 进行中的批量
#[derive(Clone)]
struct ActiveBatch {
    members: Vec<BatchMember>,
    cancel: CancellationToken,
    progress_tx: Arc<watch::Sender<BatchProgress>>,
    /// 同一批量只允许一个 await_batch
    awaiting: Arc<AtomicBool>,
}

impl ActiveBatch {
    fn new(batch_id: &str, members: Vec<BatchMember>) -> Self {
        let initial = BatchJob::new(batch_id, members.clone()).progress_view();
        let (progress_tx, _) = watch::channel(initial);
        Self {
            members,
            cancel: CancellationToken::new(),
            progress_tx: Arc::new(progress_tx),
            awaiting: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// 批量结束（或 await 被放弃）时取消所有成员轮询并注销
struct ActiveBatchGuard<'a> {
    active: &'a DashMap<String, ActiveBatch>,
    batch_id: String,
    cancel: CancellationToken,
}

impl Drop for ActiveBatchGuard<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.active.remove(&self.batch_id);
        tracing::debug!(batch_id = %self.batch_id, "Batch trackers torn down");
    }
}

/// 批量协调器
pub struct BatchCoordinator {
    backend: Arc<dyn RecognitionBackendPort>,
    tracker: TaskTracker,
    config: BatchCoordinatorConfig,
    /// batch_id -> ActiveBatch
    active: DashMap<String, ActiveBatch>,
}

impl BatchCoordinator {
    pub fn new(
        backend: Arc<dyn RecognitionBackendPort>,
        tracker: TaskTracker,
        config: BatchCoordinatorConfig,
    ) -> Self {
        Self {
            backend,
            tracker,
            config,
            active: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 以一个 multipart 请求提交全部文件
    ///
    /// 提交后批量保持登记，直到 `await_batch` 结束或调用 `cancel`
    pub async fn submit(
        &self,
        files: &[UploadFile],
        mode: &ProcessingMode,
    ) -> Result<BatchSubmission, ApplicationError> {
        if files.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "batch must contain at least one file".to_string(),
            ));
        }
        if files.len() > self.config.max_items {
            return Err(ApplicationError::rejection(format!(
                "batch of {} files exceeds the limit of {}",
                files.len(),
                self.config.max_items
            )));
        }

        let receipt = self.backend.submit_batch(files, mode).await?;

        if receipt.task_ids.len() != files.len() {
            return Err(ApplicationError::Transport(format!(
                "backend returned {} task ids for {} files",
                receipt.task_ids.len(),
                files.len()
            )));
        }

        let members = files
            .iter()
            .zip(receipt.task_ids.iter())
            .map(|(file, task_id)| BatchMember::new(task_id.clone(), file.file_name.clone()))
            .collect();
        self.active
            .insert(receipt.batch_id.clone(), ActiveBatch::new(&receipt.batch_id, members));

        tracing::info!(
            batch_id = %receipt.batch_id,
            files = files.len(),
            mode = %mode,
            "Batch submitted"
        );

        Ok(BatchSubmission {
            batch_id: receipt.batch_id,
            task_ids: receipt.task_ids,
        })
    }

    /// 等待批量完成
    ///
    /// 所有成员终态后发起一次结果请求。单个成员失败不会中止其他成员。
    /// 丢弃返回的 future 会停止全部成员轮询。同一批量同时只能有一个等待者，
    /// 第二个等待者得到 `InvalidInput`。
    pub async fn await_batch(&self, batch_id: &str) -> Result<BatchResult, ApplicationError> {
        let registered = self.active.get(batch_id).map(|a| a.clone());
        let active = match registered {
            Some(active) => active,
            None => self.discover(batch_id).await?,
        };

        if active.awaiting.swap(true, Ordering::SeqCst) {
            return Err(ApplicationError::InvalidInput(format!(
                "batch {} is already being awaited",
                batch_id
            )));
        }

        let _guard = ActiveBatchGuard {
            active: &self.active,
            batch_id: batch_id.to_string(),
            cancel: active.cancel.clone(),
        };

        let mut job = BatchJob::new(batch_id, active.members.clone());
        let streams = active.members.iter().map(|member| {
            self.tracker
                .start_with_cancel(&member.task_id, active.cancel.child_token())
        });
        let mut merged = stream::select_all(streams);
        active.progress_tx.send_replace(job.progress_view());

        while !job.is_done() {
            let snapshot = tokio::select! {
                _ = active.cancel.cancelled() => {
                    tracing::info!(batch_id = %batch_id, "Batch cancelled");
                    return Err(ApplicationError::cancelled(format!("batch {}", batch_id)));
                }
                next = merged.next() => match next {
                    Some(snapshot) => snapshot,
                    None => {
                        return Err(ApplicationError::cancelled(format!(
                            "tracking for batch {} stopped before all members finished",
                            batch_id
                        )));
                    }
                },
            };

            if let Some(error) = &snapshot.error {
                tracing::warn!(
                    batch_id = %batch_id,
                    task_id = %snapshot.task_id,
                    error = %error,
                    "Batch member failed"
                );
            }

            job.apply(&snapshot);
            let view = job.progress_view();
            tracing::debug!(
                batch_id = %batch_id,
                progress = view.progress,
                completed = view.completed,
                failed = view.failed,
                total = view.total,
                "Batch progress"
            );
            active.progress_tx.send_replace(view);
        }
        drop(merged);

        let fetched = self.backend.batch_results(batch_id).await?;
        let result = job.build_result(fetched.into_iter().map(|r| r.into_snapshot()).collect());

        tracing::info!(
            batch_id = %batch_id,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "Batch finished"
        );

        Ok(result)
    }

    /// 订阅批量聚合进度
    pub fn progress(&self, batch_id: &str) -> Option<watch::Receiver<BatchProgress>> {
        self.active.get(batch_id).map(|a| a.progress_tx.subscribe())
    }

    /// 取消批量，停止全部成员轮询
    ///
    /// 尚未被等待的批量直接注销；正在等待的批量由等待方注销
    pub fn cancel(&self, batch_id: &str) -> bool {
        let removed = self
            .active
            .remove_if(batch_id, |_, active| !active.awaiting.load(Ordering::SeqCst));
        if let Some((_, active)) = removed {
            active.cancel.cancel();
            tracing::info!(batch_id = %batch_id, "Unawaited batch cancelled");
            return true;
        }

        match self.active.get(batch_id) {
            Some(active) => {
                active.cancel.cancel();
                tracing::info!(batch_id = %batch_id, "Batch cancel requested");
                true
            }
            None => false,
        }
    }

    /// 进行中的批量数
    pub fn active_batches(&self) -> usize {
        self.active.len()
    }

    /// 未经本协调器提交的批量：通过批量状态接口获取成员
    async fn discover(&self, batch_id: &str) -> Result<ActiveBatch, ApplicationError> {
        let status = self.backend.batch_status(batch_id).await?;

        let members: Vec<BatchMember> = status
            .tasks
            .into_iter()
            .map(|t| {
                let file_name = t.file_name.unwrap_or_else(|| t.task_id.clone());
                BatchMember::new(t.task_id, file_name)
            })
            .collect();

        tracing::debug!(
            batch_id = %batch_id,
            members = members.len(),
            backend_progress = status.progress,
            "Discovered batch members"
        );

        // 并发发现同一批量时共用先登记的一份
        let active = self
            .active
            .entry(batch_id.to_string())
            .or_insert_with(|| ActiveBatch::new(batch_id, members))
            .clone();
        Ok(active)
    }
}
