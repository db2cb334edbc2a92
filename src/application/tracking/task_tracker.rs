//! Task Tracker - 单任务轮询
//!
//! 每个 tracker 拥有自己的轮询定时器。快照按进度非递减顺序输出，
//! 终态快照总是最后一个。任何请求错误都会立即产生失败终态（不重试）。

use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::application::ports::RecognitionBackendPort;
use crate::domain::task::TaskSnapshot;

/// 快照通道容量
const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Tracker 配置
#[derive(Debug, Clone)]
pub struct TaskTrackerConfig {
    /// 轮询间隔
    pub poll_interval: Duration,
}

impl Default for TaskTrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// 任务快照流
///
/// 丢弃该流会停止对应的轮询循环
pub struct TaskSnapshotStream {
    task_id: String,
    receiver: mpsc::Receiver<TaskSnapshot>,
    _guard: DropGuard,
}

impl TaskSnapshotStream {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 等待下一个快照；轮询结束后返回 None
    pub async fn next_snapshot(&mut self) -> Option<TaskSnapshot> {
        self.receiver.recv().await
    }

    /// 消费整个流，返回终态快照
    ///
    /// 如果轮询在终态前被取消，返回 None
    pub async fn into_terminal(mut self) -> Option<TaskSnapshot> {
        while let Some(snapshot) = self.receiver.recv().await {
            if snapshot.is_terminal() {
                return Some(snapshot);
            }
        }
        None
    }
}

impl Stream for TaskSnapshotStream {
    type Item = TaskSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// 任务跟踪器
#[derive(Clone)]
pub struct TaskTracker {
    backend: Arc<dyn RecognitionBackendPort>,
    config: TaskTrackerConfig,
}

impl TaskTracker {
    pub fn new(backend: Arc<dyn RecognitionBackendPort>, config: TaskTrackerConfig) -> Self {
        Self { backend, config }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// 开始轮询任务状态
    pub fn start(&self, task_id: &str) -> TaskSnapshotStream {
        self.start_with_cancel(task_id, CancellationToken::new())
    }

    /// 开始轮询任务状态，可通过 `cancel` 在任意挂起点停止
    pub fn start_with_cancel(&self, task_id: &str, cancel: CancellationToken) -> TaskSnapshotStream {
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);

        tokio::spawn(poll_loop(
            self.backend.clone(),
            task_id.to_string(),
            self.config.poll_interval,
            tx,
            cancel.clone(),
        ));

        tracing::debug!(task_id = %task_id, "Task tracking started");

        TaskSnapshotStream {
            task_id: task_id.to_string(),
            receiver: rx,
            _guard: cancel.drop_guard(),
        }
    }
}

async fn poll_loop(
    backend: Arc<dyn RecognitionBackendPort>,
    task_id: String,
    poll_interval: Duration,
    tx: mpsc::Sender<TaskSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_progress = 0u8;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let report = tokio::select! {
            _ = cancel.cancelled() => break,
            report = backend.task_status(&task_id) => report,
        };

        let mut snapshot = match report {
            Ok(report) => {
                let mut snapshot = report.into_snapshot();
                snapshot.task_id = task_id.clone();
                snapshot
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Task status request failed");
                TaskSnapshot::failed(
                    task_id.clone(),
                    last_progress,
                    format!("status request failed: {}", e),
                )
            }
        };

        snapshot.progress = snapshot.progress.max(last_progress);
        last_progress = snapshot.progress;
        let terminal = snapshot.is_terminal();

        tracing::trace!(
            task_id = %task_id,
            status = %snapshot.status,
            progress = snapshot.progress,
            phase = snapshot.phase().label(),
            "Task snapshot"
        );

        if cancel.is_cancelled() {
            break;
        }
        if tx.send(snapshot).await.is_err() {
            tracing::debug!(task_id = %task_id, "Snapshot receiver dropped, stopping");
            return;
        }
        if terminal {
            tracing::debug!(task_id = %task_id, "Task reached terminal state");
            return;
        }
    }

    tracing::debug!(task_id = %task_id, "Task tracking cancelled");
}
