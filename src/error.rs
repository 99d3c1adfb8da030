use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::response::ErrorBody;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    /// 后端写入/删除失败，消息为后端原始错误文本
    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Signing(String),

    #[error("Storage operation timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("File too large: maximum allowed size is {} MB", .max_size / 1024 / 1024)]
    FileTooLarge { max_size: u64 },

    #[error("Unsupported file type: {file_type}")]
    UnsupportedFileType { file_type: String },

    #[error("File not found")]
    FileNotFound { key: String },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 对应的HTTP状态码
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedFileType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::Config(_)
            | AppError::Storage(_)
            | AppError::Signing(_)
            | AppError::Timeout { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        } else {
            tracing::warn!("请求被拒绝 ({}): {}", status.as_u16(), self);
        }

        let body = match &self {
            AppError::FileNotFound { .. } => ErrorBody::not_found_file(),
            _ => ErrorBody::new(self.to_string()),
        };

        (status, body).into_response()
    }
}

/// 应用程序Result类型别名
pub type AppResult<T> = Result<T, AppError>;

/// 错误构造辅助函数
impl AppError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    pub fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn file_not_found<T: Into<String>>(key: T) -> Self {
        Self::FileNotFound { key: key.into() }
    }

    pub fn file_too_large(max_size: u64) -> Self {
        Self::FileTooLarge { max_size }
    }

    pub fn unsupported_file_type<T: Into<String>>(file_type: T) -> Self {
        Self::UnsupportedFileType {
            file_type: file_type.into(),
        }
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        Self::Storage(msg.into())
    }

    pub fn signing<T: Into<String>>(msg: T) -> Self {
        Self::Signing(msg.into())
    }

    pub fn timeout<T: Into<String>>(operation: T, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_creation() {
        let err = AppError::validation("No file uploaded");
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "No file uploaded");
    }

    #[test]
    fn test_file_too_large_error() {
        let err = AppError::file_too_large(10 * 1024 * 1024);
        assert!(matches!(err, AppError::FileTooLarge { .. }));
        assert_eq!(
            err.to_string(),
            "File too large: maximum allowed size is 10 MB"
        );
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::bad_request("key is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::file_not_found("uploads/x.png").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::forbidden("bad signature").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::storage("connection reset").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::timeout("write", 30).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_keeps_backend_text() {
        let err = AppError::storage("SlowDown: please reduce your request rate");
        assert_eq!(err.to_string(), "SlowDown: please reduce your request rate");
    }

    #[test]
    fn test_internal_error_from_anyhow() {
        let err: AppError = anyhow::anyhow!("worker panicked").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error: worker panicked");
    }
}
