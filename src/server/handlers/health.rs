// 健康检查 API

use crate::server::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;

use super::ApiResponse;

/// 服务运行状态
#[derive(Debug, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub version: &'static str,
    /// 跟踪中的下载数
    pub tracked_downloads: usize,
    /// 是否处于轮询状态
    pub polling: bool,
    /// 已连接的标签页数
    pub connections: usize,
}

/// GET /health
pub async fn health_check(State(app_state): State<AppState>) -> Json<ApiResponse<HealthInfo>> {
    Json(ApiResponse::success(HealthInfo {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tracked_downloads: app_state.coordinator.downloads().len(),
        polling: app_state.coordinator.is_polling(),
        connections: app_state.ws_manager.connection_count(),
    }))
}
