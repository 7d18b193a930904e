// 用户选项 API

use crate::platform::OptionsStore;
use crate::server::error::ApiResult;
use crate::server::AppState;
use crate::status::{OptionChange, OptionsSnapshot};
use axum::{extract::State, response::Json};
use tracing::info;

use super::ApiResponse;

/// GET /api/v1/options
/// 读取全部选项
pub async fn get_options(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<OptionsSnapshot>>> {
    let snapshot = app_state.options_store.get_all().await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// PUT /api/v1/options
/// 整体替换选项，返回实际发生的变更
pub async fn put_options(
    State(app_state): State<AppState>,
    Json(next): Json<OptionsSnapshot>,
) -> ApiResult<Json<ApiResponse<Vec<OptionChange>>>> {
    let current = app_state.options_store.get_all().await?;
    let changes = current.diff(&next);

    if !changes.is_empty() {
        info!(
            "更新选项: {:?}",
            changes.iter().map(|c| c.key.as_str()).collect::<Vec<_>>()
        );
        app_state.options_store.set(changes.clone()).await?;
    }

    Ok(Json(ApiResponse::success(changes)))
}
