//! WebSocket 消息类型定义

use crate::status::{DownloadRecord, StatusCommand};
use serde::{Deserialize, Serialize};

/// 客户端发送给服务端的消息
///
/// 内容脚本命令按 `event` 区分，连接控制消息按 `type` 区分
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WsClientMessage {
    /// 下载命令
    Command(StatusCommand),
    /// 连接控制
    Control(WsControlMessage),
}

/// 连接控制消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsControlMessage {
    /// 心跳 Ping
    Ping {
        /// 客户端时间戳（毫秒）
        timestamp: i64,
    },
    /// 页面导航完成，请求当前下载列表
    PageLoaded,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// 连接成功
    Connected {
        /// 连接 ID（即标签页 ID）
        connection_id: String,
        /// 服务端时间戳
        timestamp: i64,
    },
    /// 心跳 Pong
    Pong {
        /// 服务端时间戳（毫秒）
        timestamp: i64,
        /// 回显客户端时间戳（用于计算延迟）
        client_timestamp: Option<i64>,
    },
    /// 下载列表
    Downloads { downloads: Vec<DownloadRecord> },
    /// 错误消息
    Error {
        /// 错误码
        code: String,
        /// 错误信息
        message: String,
    },
}

impl WsServerMessage {
    /// 创建 Pong 消息
    pub fn pong(client_timestamp: Option<i64>) -> Self {
        Self::Pong {
            timestamp: chrono::Utc::now().timestamp_millis(),
            client_timestamp,
        }
    }

    /// 创建 Connected 消息
    pub fn connected(connection_id: String) -> Self {
        Self::Connected {
            connection_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn downloads(downloads: Vec<DownloadRecord>) -> Self {
        Self::Downloads { downloads }
    }

    /// 创建错误消息
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
