// 下载状态 API
//
// 宿主桥接通过这些接口上报下载事件，也可以在不连接 WebSocket 的情况下发送命令

use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::status::{DownloadDelta, DownloadId, DownloadRecord, StatusCommand};
use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::{debug, info};

use super::ApiResponse;

/// POST /api/v1/downloads
/// 上报新创建的下载
pub async fn report_created(
    State(app_state): State<AppState>,
    Json(record): Json<DownloadRecord>,
) -> ApiResult<Json<ApiResponse<DownloadRecord>>> {
    info!("下载已创建: id={}, 文件={:?}", record.id, record.filename);

    app_state.registry.upsert(record.clone());
    app_state.coordinator.on_download_created(record.clone());

    Ok(Json(ApiResponse::success(record)))
}

/// PATCH /api/v1/downloads/:id
/// 上报下载变更增量，返回更新后的权威记录
pub async fn report_changed(
    State(app_state): State<AppState>,
    Path(id): Path<DownloadId>,
    Json(delta): Json<DownloadDelta>,
) -> ApiResult<Json<ApiResponse<DownloadRecord>>> {
    if delta.id != id {
        return Err(ApiError::BadRequest(format!(
            "路径中的下载 ID {} 与请求体中的 {} 不一致",
            id, delta.id
        )));
    }

    let record = app_state.registry.apply_delta(&delta)?;
    debug!("下载已变更: id={}, 状态={}", id, record.state.as_str());
    app_state.coordinator.on_download_changed(&delta);

    Ok(Json(ApiResponse::success(record)))
}

/// DELETE /api/v1/downloads/:id
/// 上报下载已从浏览器历史中清除，下一轮对账时从列表移除
pub async fn report_erased(
    State(app_state): State<AppState>,
    Path(id): Path<DownloadId>,
) -> ApiResult<Json<ApiResponse<DownloadRecord>>> {
    let record = app_state
        .registry
        .remove(id)
        .ok_or_else(|| ApiError::NotFound(format!("下载 {} 不在注册表中", id)))?;
    info!("下载已从注册表清除: id={}", id);
    app_state.coordinator.refresh().await;

    Ok(Json(ApiResponse::success(record)))
}

/// GET /api/v1/downloads
/// 当前跟踪的下载列表
pub async fn list_downloads(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<DownloadRecord>>>> {
    Ok(Json(ApiResponse::success(app_state.coordinator.downloads())))
}

/// GET /api/v1/downloads/registry/:id
/// 注册表中的权威记录（桥接据此回读控制操作的结果）
pub async fn get_registry_download(
    State(app_state): State<AppState>,
    Path(id): Path<DownloadId>,
) -> ApiResult<Json<ApiResponse<DownloadRecord>>> {
    app_state
        .registry
        .get(id)
        .map(|record| Json(ApiResponse::success(record)))
        .ok_or_else(|| ApiError::NotFound(format!("下载 {} 不在注册表中", id)))
}

/// POST /api/v1/downloads/commands
/// 执行命令，返回执行后的跟踪列表
pub async fn run_command(
    State(app_state): State<AppState>,
    Json(command): Json<StatusCommand>,
) -> ApiResult<Json<ApiResponse<Vec<DownloadRecord>>>> {
    app_state.coordinator.handle_command(command).await?;
    Ok(Json(ApiResponse::success(app_state.coordinator.downloads())))
}
