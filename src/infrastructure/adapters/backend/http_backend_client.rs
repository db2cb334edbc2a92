//! HTTP Recognition Client - 调用远程识别服务
//!
//! 实现 RecognitionBackendPort trait，通过 HTTP 调用外部识别服务
//!
//! 外部识别 API:
//! POST {base}/api/ocr/tasks              multipart: file, mode  -> {"task_id": "..."}
//! POST {base}/api/ocr/batches            multipart: files[], mode -> {"batch_id": "...", "task_ids": [...]}
//! GET  {base}/api/ocr/tasks/{id}         -> {"status": "...", "progress": 42, "error": null, "result": null}
//! GET  {base}/api/ocr/batches/{id}       -> {"batch_id": "...", "progress": 42, "tasks": [...]}
//! GET  {base}/api/ocr/batches/{id}/results -> {"results": [...]}

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::application::ports::{
    BackendError, BatchReceipt, BatchStatusReport, RecognitionBackendPort, TaskReceipt,
    TaskStatusReport,
};
use crate::domain::task::{ProcessingMode, TaskStatus, UploadFile};

/// 后端返回的任务状态（进度可能是浮点数）
#[derive(Debug, Deserialize)]
struct WireTaskStatus {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

impl WireTaskStatus {
    fn into_report(self, fallback_task_id: &str) -> Result<TaskStatusReport, BackendError> {
        let status = TaskStatus::from_str(&self.status).ok_or_else(|| {
            BackendError::InvalidResponse(format!("unknown task status: {}", self.status))
        })?;
        let progress = self
            .progress
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        Ok(TaskStatusReport {
            task_id: self.task_id.unwrap_or_else(|| fallback_task_id.to_string()),
            file_name: self.file_name,
            status,
            progress,
            error: self.error,
            result: self.result,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireBatchStatus {
    batch_id: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    tasks: Vec<WireTaskStatus>,
}

#[derive(Debug, Deserialize)]
struct WireBatchResults {
    #[serde(default)]
    results: Vec<WireTaskStatus>,
}

/// HTTP 识别客户端配置
#[derive(Debug, Clone)]
pub struct HttpRecognitionClientConfig {
    /// 识别服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpRecognitionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 60,
        }
    }
}

impl HttpRecognitionClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 识别客户端
pub struct HttpRecognitionClient {
    client: Client,
    base_url: String,
}

impl HttpRecognitionClient {
    /// 创建新的 HTTP 识别客户端
    pub fn new(config: HttpRecognitionClientConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tasks_url(&self) -> String {
        format!("{}/api/ocr/tasks", self.base_url)
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/api/ocr/tasks/{}", self.base_url, task_id)
    }

    fn batches_url(&self) -> String {
        format!("{}/api/ocr/batches", self.base_url)
    }

    fn batch_url(&self, batch_id: &str) -> String {
        format!("{}/api/ocr/batches/{}", self.base_url, batch_id)
    }

    fn batch_results_url(&self, batch_id: &str) -> String {
        format!("{}/api/ocr/batches/{}/results", self.base_url, batch_id)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    fn file_part(file: &UploadFile) -> Part {
        Part::bytes(file.content.clone()).file_name(file.file_name.clone())
    }

    /// 发送请求并解析 JSON 响应
    async fn send_json<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await.map_err(map_send_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::NetworkError(format!("Cannot connect to recognition service: {}", e))
    } else {
        BackendError::NetworkError(e.to_string())
    }
}

/// 4xx 视为拒绝（404 视为不存在），5xx 视为服务错误
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status.as_u16(), &url, body))
}

fn classify_status(status: u16, path: &str, body: String) -> BackendError {
    match status {
        404 => BackendError::NotFound(path.to_string()),
        400..=499 => BackendError::Rejected {
            status,
            message: body,
        },
        _ => BackendError::ServiceError(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl RecognitionBackendPort for HttpRecognitionClient {
    async fn submit_task(
        &self,
        file: &UploadFile,
        mode: &ProcessingMode,
    ) -> Result<TaskReceipt, BackendError> {
        tracing::debug!(
            url = %self.tasks_url(),
            file_name = %file.file_name,
            size_bytes = file.size_bytes(),
            mode = %mode,
            "Submitting recognition task"
        );

        let form = Form::new()
            .text("mode", mode.as_str().to_string())
            .part("file", Self::file_part(file));

        let receipt: TaskReceipt =
            Self::send_json(self.client.post(self.tasks_url()).multipart(form)).await?;

        tracing::info!(task_id = %receipt.task_id, file_name = %file.file_name, "Task submitted");
        Ok(receipt)
    }

    async fn submit_batch(
        &self,
        files: &[UploadFile],
        mode: &ProcessingMode,
    ) -> Result<BatchReceipt, BackendError> {
        tracing::debug!(
            url = %self.batches_url(),
            files = files.len(),
            mode = %mode,
            "Submitting recognition batch"
        );

        let form = files.iter().fold(
            Form::new().text("mode", mode.as_str().to_string()),
            |form, file| form.part("files", Self::file_part(file)),
        );

        Self::send_json(self.client.post(self.batches_url()).multipart(form)).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusReport, BackendError> {
        let wire: WireTaskStatus = Self::send_json(self.client.get(self.task_url(task_id))).await?;
        wire.into_report(task_id)
    }

    async fn batch_status(&self, batch_id: &str) -> Result<BatchStatusReport, BackendError> {
        let wire: WireBatchStatus =
            Self::send_json(self.client.get(self.batch_url(batch_id))).await?;
        parse_batch_status(wire)
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<TaskStatusReport>, BackendError> {
        let wire: WireBatchResults =
            Self::send_json(self.client.get(self.batch_results_url(batch_id))).await?;
        parse_results(wire)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn parse_batch_status(wire: WireBatchStatus) -> Result<BatchStatusReport, BackendError> {
    let tasks = wire
        .tasks
        .into_iter()
        .map(|t| {
            let fallback = t.task_id.clone().unwrap_or_default();
            if fallback.is_empty() {
                return Err(BackendError::InvalidResponse(
                    "batch member without task_id".to_string(),
                ));
            }
            t.into_report(&fallback)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BatchStatusReport {
        batch_id: wire.batch_id,
        progress: wire
            .progress
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0),
        tasks,
    })
}

fn parse_results(wire: WireBatchResults) -> Result<Vec<TaskStatusReport>, BackendError> {
    wire.results
        .into_iter()
        .map(|t| {
            let fallback = t.task_id.clone().unwrap_or_default();
            if fallback.is_empty() {
                return Err(BackendError::InvalidResponse(
                    "result without task_id".to_string(),
                ));
            }
            t.into_report(&fallback)
        })
        .collect()
}
