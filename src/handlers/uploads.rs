use crate::{
    error::{AppError, AppResult},
    handlers::AppState,
    services::{UploadDescriptor, UploadedFile},
};
use axum::{
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::Json,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const SINGLE_FIELD: &str = "image";
const BATCH_FIELD: &str = "images";

/// 单图上传表单
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImageUploadForm {
    /// 图片文件
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

/// 多图上传表单
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImagesUploadForm {
    /// 图片文件，可重复
    #[schema(value_type = Vec<String>)]
    pub images: Vec<Vec<u8>>,
}

/// 单图上传响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageUploadResponse {
    pub message: String,
    pub file: UploadDescriptor,
}

/// 多图上传响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImagesUploadResponse {
    pub message: String,
    pub files: Vec<UploadDescriptor>,
}

/// 上传单张图片
#[utoipa::path(
    post,
    path = "/api/upload-image",
    tag = "uploads",
    request_body(content = ImageUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "上传成功", body = ImageUploadResponse),
        (status = 400, description = "缺少文件或表单格式错误", body = crate::response::ErrorBody),
        (status = 413, description = "文件超过大小限制", body = crate::response::ErrorBody),
        (status = 415, description = "不支持的文件类型", body = crate::response::ErrorBody),
        (status = 500, description = "存储后端错误", body = crate::response::ErrorBody)
    )
)]
pub async fn upload_image(
    State(app_state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<ImageUploadResponse>)> {
    let multipart = multipart.map_err(|e| AppError::bad_request(e.body_text()))?;
    let max_size = app_state.config.max_upload_bytes();

    let mut files = collect_files(multipart, SINGLE_FIELD, 1, max_size).await?;
    let file = files.pop().ok_or_else(|| {
        AppError::bad_request(format!(
            "No file uploaded: expected a file in the '{}' field",
            SINGLE_FIELD
        ))
    })?;

    let descriptor = app_state.uploads.upload_one(file).await?;
    tracing::info!(
        "图片上传成功: {} ({} 字节, 容器: {})",
        descriptor.key,
        descriptor.size,
        descriptor.bucket
    );

    Ok((
        StatusCode::CREATED,
        Json(ImageUploadResponse {
            message: "Image uploaded successfully".to_string(),
            file: descriptor,
        }),
    ))
}

/// 批量上传图片
#[utoipa::path(
    post,
    path = "/api/upload-images",
    tag = "uploads",
    request_body(content = ImagesUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "全部上传成功", body = ImagesUploadResponse),
        (status = 400, description = "缺少文件、文件数超限或表单格式错误", body = crate::response::ErrorBody),
        (status = 413, description = "文件超过大小限制", body = crate::response::ErrorBody),
        (status = 415, description = "不支持的文件类型", body = crate::response::ErrorBody),
        (status = 500, description = "存储后端错误，整批失败", body = crate::response::ErrorBody)
    )
)]
pub async fn upload_images(
    State(app_state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<ImagesUploadResponse>)> {
    let multipart = multipart.map_err(|e| AppError::bad_request(e.body_text()))?;
    let max_size = app_state.config.max_upload_bytes();
    let max_files = app_state.config.upload.max_files;

    let files = collect_files(multipart, BATCH_FIELD, max_files, max_size).await?;
    if files.is_empty() {
        return Err(AppError::bad_request(format!(
            "No files uploaded: expected files in the '{}' field",
            BATCH_FIELD
        )));
    }

    let descriptors = app_state.uploads.upload_batch(files).await?;
    tracing::info!("批量上传成功: {} 个文件", descriptors.len());

    Ok((
        StatusCode::CREATED,
        Json(ImagesUploadResponse {
            message: "Images uploaded successfully".to_string(),
            files: descriptors,
        }),
    ))
}

/// 读取multipart中的文件字段
///
/// 文本字段被忽略；未选择文件时浏览器发送的空文件字段视为不存在。
/// 单个文件超过 `max_size` 时在读取过程中立即终止，不会进入存储流程。
async fn collect_files(
    mut multipart: Multipart,
    field_name: &str,
    max_files: usize,
    max_size: usize,
) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let name = field.name().unwrap_or("").to_string();
        if name != field_name {
            return Err(AppError::bad_request(format!(
                "Unexpected file field '{}': expected '{}'",
                name, field_name
            )));
        }

        let content_type = field.content_type().map(str::to_string);
        let mut data = BytesMut::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_size))?
        {
            if data.len() + chunk.len() > max_size {
                return Err(AppError::file_too_large(max_size as u64));
            }
            data.extend_from_slice(&chunk);
        }

        if original_name.is_empty() && data.is_empty() {
            continue;
        }
        if files.len() >= max_files {
            return Err(AppError::bad_request(format!(
                "Too many files: at most {} allowed in the '{}' field",
                max_files, field_name
            )));
        }

        tracing::debug!("收到文件: {} ({} 字节)", original_name, data.len());
        files.push(UploadedFile {
            original_name: Some(original_name),
            content_type,
            data: data.freeze(),
        });
    }

    Ok(files)
}

fn multipart_error(err: MultipartError, max_size: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::file_too_large(max_size as u64)
    } else {
        AppError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}
