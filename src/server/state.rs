// 应用状态

use crate::config::AppConfig;
use crate::platform::{FileOptionsStore, LocalDownloadRegistry};
use crate::server::websocket::WebSocketManager;
use crate::status::DownloadStatusCoordinator;
use anyhow::Context;
use std::sync::Arc;

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 进程内下载注册表（宿主桥接上报的权威数据）
    pub registry: Arc<LocalDownloadRegistry>,
    /// WebSocket 管理器（兼作标签页注册表）
    pub ws_manager: Arc<WebSocketManager>,
    /// 用户选项存储
    pub options_store: Arc<FileOptionsStore>,
    /// 下载状态协调器
    pub coordinator: Arc<DownloadStatusCoordinator>,
}

impl AppState {
    /// 创建应用状态，并把协调器接入选项存储
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(LocalDownloadRegistry::new());
        let ws_manager = Arc::new(WebSocketManager::new());

        let options_store = Arc::new(
            FileOptionsStore::open(config.options.path.clone())
                .await
                .with_context(|| format!("加载选项文件失败: {:?}", config.options.path))?,
        );

        let coordinator = DownloadStatusCoordinator::new(
            registry.clone(),
            ws_manager.clone(),
            config.status.to_coordinator_config(),
        );
        coordinator
            .attach_options(options_store.clone())
            .await
            .context("接入选项存储失败")?;

        Ok(Self {
            config: Arc::new(config),
            registry,
            ws_manager,
            options_store,
            coordinator,
        })
    }

    /// 停止所有后台任务
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.options_store.stop_watching();
    }
}
