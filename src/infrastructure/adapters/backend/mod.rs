//! Backend Adapter - 识别后端客户端实现

mod fake_backend_client;
mod http_backend_client;

pub use fake_backend_client::{FakeRecognitionBackend, FakeStep};
pub use http_backend_client::*;
