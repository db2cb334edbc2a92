//! Event Transport Port - 持久事件通道
//!
//! 服务端推送以换行分隔的文本事件，客户端只负责建立连接

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// 事件通道错误
#[derive(Debug, Error)]
pub enum EventTransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Receive error: {0}")]
    ReceiveError(String),
}

/// 一次连接上收到的文本帧；流结束表示连接关闭
pub type EventFrames = BoxStream<'static, Result<String, EventTransportError>>;

/// Event Transport Port
#[async_trait]
pub trait EventTransportPort: Send + Sync {
    /// 建立连接，返回就绪后的帧流
    async fn connect(&self) -> Result<EventFrames, EventTransportError>;
}
