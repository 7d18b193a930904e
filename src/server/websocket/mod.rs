//! WebSocket 模块
//!
//! 标签页通过 WebSocket 接收下载列表并发送命令

mod handler;
mod manager;
mod message;

pub use handler::handle_websocket;
pub use manager::WebSocketManager;
pub use message::{WsClientMessage, WsControlMessage, WsServerMessage};
