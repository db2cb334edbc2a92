//! WebSocket Adapter - 事件通道的 WebSocket 实现

mod ws_event_transport;

pub use ws_event_transport::WsEventTransport;
