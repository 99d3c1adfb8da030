use crate::{
    docs::ApiDoc,
    handlers::{
        AppState, delete_file, delete_signed, health_check, issue_delete_url, readiness,
        upload_image, upload_images,
    },
    origin::{OriginMatcher, cors_layer, enforce_origin},
    response::fallback_not_found,
    storage::{local::ASSETS_ROUTE, signing::SIGNED_DELETE_ROUTE},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    middleware,
    response::Json,
    routing::{delete as axum_delete, get, post},
};
use std::{path::Path, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;

/// multipart边界和表单字段的额外开销
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// 创建API路由
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        // 健康检查
        .route("/api/health", get(health_check))
        .route("/api/ready", get(readiness))
        // 上传
        .route("/api/upload-image", post(upload_image))
        .route("/api/upload-images", post(upload_images))
        // 文件管理
        .route("/api/files/delete-url", post(issue_delete_url))
        .route("/api/files", axum_delete(delete_file))
        .route(SIGNED_DELETE_ROUTE, axum_delete(delete_signed))
}

/// 组装完整应用：业务路由、接口文档、本地文件静态服务及各层中间件
pub fn create_app(app_state: AppState) -> Router {
    let config = app_state.config.clone();
    let matcher = Arc::new(OriginMatcher::new(config.server.allowed_origins.as_slice()));

    // 单文件上限在读取multipart时逐个检查，这里只限制整个请求体
    let body_limit = config
        .max_upload_bytes()
        .saturating_mul(config.upload.max_files.max(1))
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let mut router = Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(create_api_routes());

    if let Some(root) = app_state.storage.local_root().map(Path::to_path_buf) {
        tracing::info!("静态文件服务: {} -> {}", ASSETS_ROUTE, root.display());
        let assets = ServeDir::new(root)
            .call_fallback_on_method_not_allowed(true)
            .not_found_service(fallback_not_found.into_service());
        router = router.nest_service(ASSETS_ROUTE, assets);
    }

    router
        .fallback(fallback_not_found)
        .method_not_allowed_fallback(fallback_not_found)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(matcher.clone(), enforce_origin))
        .layer(cors_layer(matcher))
        .layer(TraceLayer::new_for_http())
}
