//! WebSocket 路由处理器

use crate::server::websocket::message::{WsClientMessage, WsControlMessage, WsServerMessage};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket 路由处理器
///
/// 升级 HTTP 连接为 WebSocket，处理消息收发
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// 处理 WebSocket 连接
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!("新的 WebSocket 连接: {}", connection_id);

    let (sender, receiver) = socket.split();
    run_connection(sender, receiver, state, connection_id).await;
}

/// 驱动单个连接直到任一方向结束
///
/// 连接被管理器移除（例如超时清理）时发送通道关闭，此时向客户端发送 Close 帧，
/// 并中止接收任务，让标签页感知断开后重连
async fn run_connection<S, R, E>(mut sender: S, mut receiver: R, state: AppState, connection_id: String)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let mut message_receiver = state.ws_manager.register(connection_id.clone());

    let connected_msg = WsServerMessage::connected(connection_id.clone());
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        if sender.send(Message::Text(json)).await.is_err() {
            error!("发送连接成功消息失败");
            state.ws_manager.unregister(&connection_id);
            return;
        }
    }

    // 新连接视为一次导航完成，立即推送当前列表
    state.coordinator.on_tab_loaded(&connection_id).await;

    let ws_manager = Arc::clone(&state.ws_manager);

    // 发送任务
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = message_receiver.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                }
            }
        }
        // 通道关闭说明连接已被移除
        let _ = sender.send(Message::Close(None)).await;
    });

    let state_recv = state.clone();
    let conn_id_recv = connection_id.clone();

    // 接收任务
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    handle_client_message(&state_recv, &conn_id_recv, &text).await;
                }
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => handle_client_message(&state_recv, &conn_id_recv, &text).await,
                    Err(_) => warn!("忽略非 UTF-8 二进制消息: {}", conn_id_recv),
                },
                Message::Ping(_) | Message::Pong(_) => {
                    state_recv.ws_manager.touch(&conn_id_recv);
                }
                Message::Close(_) => {
                    info!("收到关闭消息: {}", conn_id_recv);
                    break;
                }
            }
        }
    });

    // 等待任一任务结束，并中止另一个
    tokio::select! {
        _ = &mut send_task => {
            debug!("发送任务结束: {}", connection_id);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("接收任务结束: {}", connection_id);
            send_task.abort();
        }
    }

    ws_manager.unregister(&connection_id);
    info!("WebSocket 连接已关闭: {}", connection_id);
}

/// 处理客户端消息
async fn handle_client_message(state: &AppState, connection_id: &str, text: &str) {
    state.ws_manager.touch(connection_id);

    let message = match serde_json::from_str::<WsClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("解析客户端消息失败: {} - {}", connection_id, e);
            let error = WsServerMessage::error("PARSE_ERROR", format!("消息解析失败: {}", e));
            state.ws_manager.send_to(connection_id, error);
            return;
        }
    };

    match message {
        WsClientMessage::Command(command) => {
            let name = command.name();
            // 失败已由协调器记录日志，这里只回传给发起命令的标签页
            if let Err(e) = state.coordinator.handle_command(command).await {
                let error =
                    WsServerMessage::error("COMMAND_FAILED", format!("{} 执行失败: {}", name, e));
                state.ws_manager.send_to(connection_id, error);
            }
        }
        WsClientMessage::Control(WsControlMessage::Ping { timestamp }) => {
            state
                .ws_manager
                .send_to(connection_id, WsServerMessage::pong(Some(timestamp)));
        }
        WsClientMessage::Control(WsControlMessage::PageLoaded) => {
            debug!("标签页导航完成: {}", connection_id);
            state.coordinator.on_tab_loaded(connection_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use futures::channel::mpsc;
    use serde_json::Value;
    use std::convert::Infallible;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn test_state(dir: &TempDir) -> AppState {
        let mut config = AppConfig::default();
        config.options.path = dir.path().join("options.json");
        AppState::new(config).await.unwrap()
    }

    fn frame_type(message: Message) -> String {
        match message {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                value["type"].as_str().unwrap().to_string()
            }
            other => panic!("期望文本帧，实际: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_swept_connection_is_closed() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, Infallible>>();
        let connection = tokio::spawn(run_connection(
            out_tx,
            in_rx,
            state.clone(),
            "tab-idle".to_string(),
        ));

        assert_eq!(frame_type(out_rx.next().await.unwrap()), "connected");
        assert_eq!(frame_type(out_rx.next().await.unwrap()), "downloads");
        assert_eq!(state.ws_manager.connection_count(), 1);

        // 标签页从不发送消息，超时清理后应收到 Close 帧
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.ws_manager.cleanup_stale_connections(Duration::ZERO), 1);

        let closing = out_rx.next().await.unwrap();
        assert!(matches!(closing, Message::Close(_)));

        // 客户端输入仍然打开，连接也必须结束
        tokio::time::timeout(Duration::from_secs(1), connection)
            .await
            .unwrap()
            .unwrap();
        assert!(out_rx.next().await.is_none());
        assert_eq!(state.ws_manager.connection_count(), 0);

        drop(in_tx);
        state.shutdown();
    }

    #[tokio::test]
    async fn test_client_close_unregisters() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, Infallible>>();
        let connection = tokio::spawn(run_connection(
            out_tx,
            in_rx,
            state.clone(),
            "tab-closing".to_string(),
        ));

        assert_eq!(frame_type(out_rx.next().await.unwrap()), "connected");
        assert_eq!(frame_type(out_rx.next().await.unwrap()), "downloads");

        in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        tokio::time::timeout(Duration::from_secs(1), connection)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.ws_manager.connection_count(), 0);
        state.shutdown();
    }
}
