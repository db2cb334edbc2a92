//! Ocrflow - 异步文档识别编排
//!
//! 用法: `ocrflow <mode> <file>...`
//! - 单个文件: 查缓存 → 提交 → 跟踪到终态 → 写缓存
//! - 多个文件: 批量提交，并发跟踪，输出聚合进度与按顺序排列的结果
//!
//! 运行期间事件通道在后台保持连接，收到的事件写入日志。

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;

use ocrflow::application::{
    BatchCoordinator, RecognizeFileCommand, RecognizeFileHandler, ResultCachePort, TaskTracker,
};
use ocrflow::config::{load_config, print_config, AppConfig};
use ocrflow::domain::task::{ProcessingMode, UploadFile};
use ocrflow::infrastructure::adapters::{HttpRecognitionClient, WsEventTransport};
use ocrflow::infrastructure::events::{EventStream, LogEventKind};
use ocrflow::infrastructure::persistence::SledResultCache;

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},ocrflow={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// 将事件通道收到的事件写入日志
fn spawn_event_logger(mut events: broadcast::Receiver<ocrflow::infrastructure::events::LogEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.kind {
                    LogEventKind::Message => tracing::info!(target: "ocrflow::backend", "{}", event.text),
                    LogEventKind::Error => tracing::warn!("{}", event.text),
                    _ => tracing::debug!("{}", event.text),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    print_config(&config);

    let mut args = std::env::args().skip(1);
    let mode = args
        .next()
        .context("usage: ocrflow <mode> <file>...")?;
    let mode = ProcessingMode::new(mode)?;
    let paths: Vec<String> = args.collect();
    if paths.is_empty() {
        anyhow::bail!("usage: ocrflow <mode> <file>...");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(UploadFile::from_path(path).await?);
    }

    // 确保缓存目录存在
    if let Some(parent) = std::path::Path::new(&config.cache.db_path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let backend = Arc::new(HttpRecognitionClient::new(config.backend.client_config())?);
    let cache: Arc<dyn ResultCachePort> =
        Arc::new(SledResultCache::new(&config.cache.sled_config())?);
    let tracker = TaskTracker::new(backend.clone(), config.tracking.tracker_config());

    let event_stream = config.events.enabled.then(|| {
        let transport = Arc::new(WsEventTransport::new(&config.events.url));
        let stream = EventStream::new(transport, config.events.stream_config());
        spawn_event_logger(stream.subscribe());
        stream.connect();
        stream
    });

    let output = if files.len() == 1 {
        let handler = RecognizeFileHandler::new(backend.clone(), cache.clone(), tracker);
        let file = files.remove(0);
        let outcome = handler.handle(RecognizeFileCommand { file, mode }).await?;
        serde_json::to_string_pretty(&outcome)?
    } else {
        let coordinator =
            BatchCoordinator::new(backend.clone(), tracker, config.batch.coordinator_config());
        let submission = coordinator.submit(&files, &mode).await?;

        if let Some(mut progress) = coordinator.progress(&submission.batch_id) {
            tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let view = progress.borrow_and_update().clone();
                    tracing::info!(
                        batch_id = %view.batch_id,
                        completed = view.completed,
                        failed = view.failed,
                        total = view.total,
                        progress = view.progress,
                        "Batch progress"
                    );
                }
            });
        }

        let result = coordinator.await_batch(&submission.batch_id).await?;
        tracing::info!(
            batch_id = %result.batch_id,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "Batch finished"
        );
        serde_json::to_string_pretty(&result)?
    };

    println!("{}", output);

    if let Some(stream) = event_stream {
        stream.stop().await;
    }

    Ok(())
}
