//! Recognize Command Handlers

use std::sync::Arc;

use crate::application::commands::recognize_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    content_fingerprint, CacheEntry, CacheError, RecognitionBackendPort, ResultCachePort,
};
use crate::application::tracking::TaskTracker;
use crate::domain::task::TaskStatus;

/// RecognizeFile Handler - 识别单个文件
///
/// 先按内容指纹查缓存，未命中时提交任务并跟踪到终态，完成后写入缓存
pub struct RecognizeFileHandler {
    backend: Arc<dyn RecognitionBackendPort>,
    cache: Arc<dyn ResultCachePort>,
    tracker: TaskTracker,
}

impl RecognizeFileHandler {
    pub fn new(
        backend: Arc<dyn RecognitionBackendPort>,
        cache: Arc<dyn ResultCachePort>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            backend,
            cache,
            tracker,
        }
    }

    pub async fn handle(
        &self,
        cmd: RecognizeFileCommand,
    ) -> Result<RecognitionOutcome, ApplicationError> {
        let fingerprint = content_fingerprint(&cmd.file.content, &cmd.mode);

        if let Some(outcome) = self.cached_outcome(&fingerprint).await {
            tracing::info!(
                task_id = %outcome.task_id,
                file_name = %cmd.file.file_name,
                "Cache hit, skipping recognition"
            );
            return Ok(outcome);
        }

        let receipt = self.backend.submit_task(&cmd.file, &cmd.mode).await?;
        let task_id = receipt.task_id;

        tracing::info!(
            task_id = %task_id,
            file_name = %cmd.file.file_name,
            mode = %cmd.mode,
            "Recognition task submitted"
        );

        let snapshot = self
            .tracker
            .start(&task_id)
            .into_terminal()
            .await
            .ok_or_else(|| ApplicationError::cancelled(format!("tracking of {} stopped", task_id)))?;

        if snapshot.status == TaskStatus::Completed {
            if let Some(result) = &snapshot.result {
                // 缓存失败不影响识别结果
                if let Err(e) = self
                    .cache
                    .put_with_fingerprint(
                        &task_id,
                        &cmd.file.file_name,
                        &cmd.mode,
                        result.clone(),
                        &fingerprint,
                    )
                    .await
                {
                    tracing::warn!(task_id = %task_id, error = %e, "Failed to cache result");
                }
            }
        } else {
            tracing::warn!(
                task_id = %task_id,
                error = snapshot.error.as_deref().unwrap_or_default(),
                "Recognition task failed"
            );
        }

        Ok(RecognitionOutcome {
            task_id,
            file_name: cmd.file.file_name,
            status: snapshot.status,
            result: snapshot.result,
            error: snapshot.error,
            from_cache: false,
        })
    }

    async fn cached_outcome(&self, fingerprint: &str) -> Option<RecognitionOutcome> {
        match self.cached_entry(fingerprint).await {
            Ok(entry) => entry.map(|entry| RecognitionOutcome {
                task_id: entry.task_id,
                file_name: entry.file_name,
                status: TaskStatus::Completed,
                result: Some(entry.result),
                error: None,
                from_cache: true,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn cached_entry(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.cache.lookup(fingerprint).await? {
            Some(task_id) => self.cache.get(&task_id).await,
            None => Ok(None),
        }
    }
}
