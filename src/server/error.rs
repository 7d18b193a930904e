// API 错误类型

use crate::platform::PlatformError;
use crate::server::handlers::ApiResponse;
use crate::status::StatusError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

/// API 错误
///
/// 转换为 HTTP 状态码 + `ApiResponse` 错误体
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("请求无效: {0}")]
    BadRequest(String),

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("状态冲突: {0}")]
    Conflict(String),

    #[error("服务暂不可用: {0}")]
    Unavailable(String),

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::NotFound(_) => ApiError::NotFound(e.to_string()),
            PlatformError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            PlatformError::TabUnavailable(_) | PlatformError::Unavailable(_) => {
                ApiError::Unavailable(e.to_string())
            }
            PlatformError::Io(_) => ApiError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl From<StatusError> for ApiError {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::Platform(platform) => platform.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("API 请求失败: {}", self);
        }
        let body = ApiResponse::<()>::error(status.as_u16() as i32, self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_mapping() {
        let not_found: ApiError = PlatformError::NotFound(3).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let conflict: ApiError = StatusError::Platform(PlatformError::InvalidState {
            id: 3,
            reason: "not paused".to_string(),
        })
        .into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let io: ApiError = PlatformError::Io("disk full".to_string()).into();
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::BadRequest("id mismatch".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
