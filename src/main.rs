use download_status::{config::LogConfig, logging, server, AppConfig, AppState};
use std::time::Duration;
use tracing::{error, info, warn};

/// 配置文件路径
const CONFIG_PATH: &str = "config/app.toml";

/// 加载日志配置
///
/// 日志系统需要先于完整配置初始化，失败时返回默认配置
async fn load_log_config() -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(CONFIG_PATH).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

/// 定期清理无心跳的标签页连接
fn spawn_stale_connection_sweep(app_state: &AppState) {
    let ws_manager = app_state.ws_manager.clone();
    let timeout = app_state.config.status.stale_timeout();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(timeout / 2);
        loop {
            ticker.tick().await;
            let removed = ws_manager.cleanup_stale_connections(timeout);
            if removed > 0 {
                info!("已清理 {} 个超时连接", removed);
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载日志配置（必须保持 _log_guard 存活）
    let log_config = load_log_config().await;
    let _log_guard = logging::init_logging(&log_config);

    info!("Download Status v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(CONFIG_PATH).await;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let watch_options = config.options.watch;

    // 创建应用状态
    let app_state = AppState::new(config).await?;
    info!("应用状态初始化完成");

    if watch_options {
        if let Err(e) = app_state.options_store.start_watching() {
            warn!("选项文件监听启动失败，修改选项需通过 API: {}", e);
        }
    }

    spawn_stale_connection_sweep(&app_state);

    let app = server::build_router(app_state.clone());

    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api/v1", addr);
    info!("WebSocket: ws://{}/api/v1/ws", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    // 监听关闭信号，支持优雅关闭
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始优雅关闭...");
        }
    }

    app_state.ws_manager.broadcast(server::websocket::WsServerMessage::error(
        "SHUTDOWN",
        "服务正在关闭",
    ));
    // 给发送任务一点时间把关闭通知写出去
    tokio::time::sleep(Duration::from_millis(100)).await;

    app_state.shutdown();
    info!("应用已安全退出");

    Ok(())
}
