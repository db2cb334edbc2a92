//! Events - 运行日志事件流
//!
//! 持久连接、断线自动重连（指数退避）、定长事件缓冲区

mod event_buffer;
mod event_stream;
mod log_event;

pub use event_buffer::EventBuffer;
pub use event_stream::{reconnect_delay, EventStream, EventStreamConfig};
pub use log_event::{ConnectionStatus, LogEvent, LogEventKind};
