//! Event stream types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEventKind {
    /// 服务端推送的一行
    Message,
    /// 合成事件：连接就绪
    Connected,
    /// 合成事件：等待重连
    Reconnecting { delay_ms: u64 },
    /// 合成事件：连接错误
    Error,
}

/// 一行运行日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(flatten)]
    pub kind: LogEventKind,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl LogEvent {
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(LogEventKind::Message, text.into())
    }

    pub fn connected() -> Self {
        Self::new(LogEventKind::Connected, "connected".to_string())
    }

    pub fn reconnecting(delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        let text = if delay_ms % 1000 == 0 {
            format!("reconnecting in {}s", delay_ms / 1000)
        } else {
            format!("reconnecting in {}ms", delay_ms)
        };
        Self::new(LogEventKind::Reconnecting { delay_ms }, text)
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::new(LogEventKind::Error, format!("connection error: {}", message))
    }

    pub fn is_message(&self) -> bool {
        self.kind == LogEventKind::Message
    }

    fn new(kind: LogEventKind, text: String) -> Self {
        Self {
            kind,
            text,
            received_at: Utc::now(),
        }
    }
}
