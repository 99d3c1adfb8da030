use crate::{
    handlers::{
        files::{DeleteFileRequest, DeleteFileResponse, DeleteUrlRequest, DeleteUrlResponse},
        health::{HealthResponse, ReadyResponse},
        uploads::{ImageUploadForm, ImageUploadResponse, ImagesUploadForm, ImagesUploadResponse},
    },
    response::ErrorBody,
    services::UploadDescriptor,
    storage::{StorageKind, Visibility},
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        // 健康检查
        crate::handlers::health::health_check,
        crate::handlers::health::readiness,
        // 上传
        crate::handlers::uploads::upload_image,
        crate::handlers::uploads::upload_images,
        // 文件管理
        crate::handlers::files::issue_delete_url,
        crate::handlers::files::delete_file,
        crate::handlers::files::delete_signed,
    ),
    components(
        schemas(
            UploadDescriptor,
            StorageKind,
            Visibility,
            ImageUploadForm,
            ImagesUploadForm,
            ImageUploadResponse,
            ImagesUploadResponse,
            DeleteUrlRequest,
            DeleteUrlResponse,
            DeleteFileRequest,
            DeleteFileResponse,
            HealthResponse,
            ReadyResponse,
            ErrorBody,
        )
    ),
    tags(
        (name = "uploads", description = "图片上传，返回读取地址和限时删除地址"),
        (name = "files", description = "删除链接签发与对象删除"),
        (name = "health", description = "存活与就绪检查")
    ),
    info(
        title = "Upload Gateway API",
        version = "0.1.0",
        description = "图片上传网关 REST API 文档"
    )
)]
pub struct ApiDoc;
