//! WebSocket Event Transport
//!
//! 连接服务端日志 WebSocket，把文本帧交给 EventStream。
//! 接收出错后流即结束，由 EventStream 的关闭处理负责重连。

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::application::ports::{EventFrames, EventTransportError, EventTransportPort};

/// WebSocket 事件通道
pub struct WsEventTransport {
    url: String,
}

impl WsEventTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// 把一条 WebSocket 消息转换为文本帧；控制帧被忽略
fn frame_text(message: Result<Message, WsError>) -> Option<Result<String, EventTransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(Message::Close(frame)) => {
            tracing::debug!(?frame, "Event server closed WebSocket");
            None
        }
        // Ping/Pong 由 tungstenite 自动处理
        Ok(_) => None,
        Err(e) => Some(Err(EventTransportError::ReceiveError(e.to_string()))),
    }
}

#[async_trait]
impl EventTransportPort for WsEventTransport {
    async fn connect(&self) -> Result<EventFrames, EventTransportError> {
        tracing::debug!(url = %self.url, "Connecting to event WebSocket");

        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| EventTransportError::ConnectFailed(format!("{}: {}", self.url, e)))?;

        let frames = ws_stream
            .scan(false, |errored, message| {
                if *errored {
                    return future::ready(None);
                }
                *errored = message.is_err();
                future::ready(Some(message))
            })
            .filter_map(|message| future::ready(frame_text(message)))
            .boxed();

        Ok(frames)
    }
}
