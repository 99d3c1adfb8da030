use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 统一错误响应格式
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// 仅在"文件不存在"时出现，固定为 false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// 错误描述
    pub error: String,
}

impl ErrorBody {
    pub fn new<T: Into<String>>(error: T) -> Self {
        Self {
            success: None,
            error: error.into(),
        }
    }

    /// 删除不存在的文件时的响应体
    pub fn not_found_file() -> Self {
        Self {
            success: Some(false),
            error: "File not found".to_string(),
        }
    }
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 未匹配路由的兜底处理器
pub async fn fallback_not_found() -> Response {
    (StatusCode::NOT_FOUND, ErrorBody::new("Not found")).into_response()
}
