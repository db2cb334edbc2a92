//! Command Handlers 实现

mod recognize_handlers;

pub use recognize_handlers::*;
