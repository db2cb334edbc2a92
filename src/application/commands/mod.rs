//! 应用层 - 命令（写操作）

mod recognize_commands;

pub mod handlers;

pub use recognize_commands::*;
