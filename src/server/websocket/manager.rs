//! WebSocket 连接管理器
//!
//! 每个连接对应一个标签页，管理器同时充当协调器的 `TabRegistry`

use crate::platform::{PlatformError, PlatformResult, TabId, TabRegistry};
use crate::server::websocket::message::WsServerMessage;
use crate::status::DownloadRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket 连接信息
#[derive(Debug)]
pub struct WsConnection {
    /// 连接 ID
    pub id: String,
    /// 消息发送通道
    pub sender: mpsc::UnboundedSender<WsServerMessage>,
    /// 连接时间
    pub connected_at: Instant,
    /// 最后活动时间
    pub last_active: Instant,
}

/// WebSocket 管理器
#[derive(Debug, Default)]
pub struct WebSocketManager {
    /// 所有连接
    connections: DashMap<String, WsConnection>,
}

impl WebSocketManager {
    /// 创建新的 WebSocket 管理器
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    // ==================== 连接管理 ====================

    /// 注册连接，返回该连接的消息接收端
    pub fn register(&self, connection_id: String) -> mpsc::UnboundedReceiver<WsServerMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        let connection = WsConnection {
            id: connection_id.clone(),
            sender,
            connected_at: now,
            last_active: now,
        };

        self.connections.insert(connection_id.clone(), connection);
        info!("WebSocket 连接已注册: {}", connection_id);

        receiver
    }

    /// 移除连接
    pub fn unregister(&self, connection_id: &str) {
        if let Some((_, conn)) = self.connections.remove(connection_id) {
            info!(
                "WebSocket 连接已移除: {}，存活 {:?}",
                connection_id,
                conn.connected_at.elapsed()
            );
        }
    }

    /// 更新连接活动时间
    pub fn touch(&self, connection_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.last_active = Instant::now();
        }
    }

    /// 获取连接数量
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 所有连接 ID
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.id.clone()).collect()
    }

    // ==================== 消息发送 ====================

    /// 向指定连接发送消息
    pub fn send_to(&self, connection_id: &str, message: WsServerMessage) -> bool {
        let conn = match self.connections.get(connection_id) {
            Some(c) => c,
            None => {
                debug!("连接不存在: {}", connection_id);
                return false;
            }
        };

        match conn.sender.send(message) {
            Ok(_) => true,
            Err(e) => {
                warn!("发送消息失败（可能连接已关闭）: {} - {}", connection_id, e);
                false
            }
        }
    }

    /// 广播消息给所有连接，移除已关闭的连接
    pub fn broadcast(&self, message: WsServerMessage) {
        let failed: Vec<String> = self
            .connections
            .iter()
            .filter(|conn| conn.sender.send(message.clone()).is_err())
            .map(|conn| conn.id.clone())
            .collect();

        for id in failed {
            self.unregister(&id);
        }
    }

    /// 清理超时连接
    pub fn cleanup_stale_connections(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|conn| now.duration_since(conn.last_active) > timeout)
            .map(|conn| conn.id.clone())
            .collect();

        for id in &stale {
            warn!("清理超时连接: {}", id);
            self.unregister(id);
        }
        stale.len()
    }
}

#[async_trait]
impl TabRegistry for WebSocketManager {
    async fn query_tabs(&self) -> PlatformResult<Vec<TabId>> {
        Ok(self.connection_ids())
    }

    async fn send_message(&self, tab: &str, downloads: &[DownloadRecord]) -> PlatformResult<()> {
        if self.send_to(tab, WsServerMessage::downloads(downloads.to_vec())) {
            Ok(())
        } else {
            Err(PlatformError::TabUnavailable(tab.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DownloadState;

    #[tokio::test]
    async fn test_register_unregister() {
        let manager = WebSocketManager::new();

        let _receiver = manager.register("conn-1".to_string());
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.connection_ids(), vec!["conn-1".to_string()]);

        manager.unregister("conn-1");
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_connection() {
        let manager = WebSocketManager::new();
        let mut receiver = manager.register("conn-1".to_string());

        assert!(manager.send_to("conn-1", WsServerMessage::pong(None)));
        assert!(!manager.send_to("conn-2", WsServerMessage::pong(None)));

        match receiver.recv().await.unwrap() {
            WsServerMessage::Pong { .. } => {}
            other => panic!("Expected Pong message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tab_registry_delivers_downloads() {
        let manager = WebSocketManager::new();
        let mut receiver = manager.register("tab-a".to_string());

        assert_eq!(manager.query_tabs().await.unwrap(), vec!["tab-a".to_string()]);

        let downloads = vec![DownloadRecord::new(4, DownloadState::InProgress)];
        manager.send_message("tab-a", &downloads).await.unwrap();

        match receiver.recv().await.unwrap() {
            WsServerMessage::Downloads { downloads } => assert_eq!(downloads[0].id, 4),
            other => panic!("Expected Downloads message, got {:?}", other),
        }

        let err = manager.send_message("tab-b", &downloads).await.unwrap_err();
        assert_eq!(err, PlatformError::TabUnavailable("tab-b".to_string()));
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_connections() {
        let manager = WebSocketManager::new();
        let mut open = manager.register("open".to_string());
        drop(manager.register("closed".to_string()));

        manager.broadcast(WsServerMessage::pong(None));

        assert!(open.recv().await.is_some());
        assert_eq!(manager.connection_ids(), vec!["open".to_string()]);
    }

    #[tokio::test]
    async fn test_cleanup_stale_connections() {
        let manager = WebSocketManager::new();
        let _receiver = manager.register("idle".to_string());

        assert_eq!(manager.cleanup_stale_connections(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(manager.cleanup_stale_connections(Duration::from_millis(10)), 1);
        assert_eq!(manager.connection_count(), 0);
    }
}
