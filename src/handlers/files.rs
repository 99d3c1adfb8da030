use crate::{
    error::{AppError, AppResult},
    handlers::AppState,
};
use axum::{
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// 签发删除链接请求
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUrlRequest {
    /// 存储键
    pub key: Option<String>,
    /// 有效期（秒），限制在 30 到 3600 之间
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUrlResponse {
    pub key: String,
    pub delete_url: String,
    pub expires_in: u64,
}

/// 直接删除请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteFileRequest {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponse {
    pub deleted: bool,
    pub key: String,
}

/// 网关签名删除链接的查询参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SignedDeleteQuery {
    /// 存储键
    pub key: String,
    /// 过期时间（Unix秒）
    pub expires: i64,
    /// 十六进制HMAC签名
    pub signature: String,
}

fn json_rejection(err: JsonRejection) -> AppError {
    AppError::bad_request(format!("Invalid JSON body: {}", err.body_text()))
}

/// 为已有对象签发限时删除链接
#[utoipa::path(
    post,
    path = "/api/files/delete-url",
    tag = "files",
    request_body = DeleteUrlRequest,
    responses(
        (status = 200, description = "签发成功", body = DeleteUrlResponse),
        (status = 400, description = "缺少或非法的key", body = crate::response::ErrorBody),
        (status = 500, description = "签名失败", body = crate::response::ErrorBody)
    )
)]
pub async fn issue_delete_url(
    State(app_state): State<AppState>,
    payload: Result<Json<DeleteUrlRequest>, JsonRejection>,
) -> AppResult<Json<DeleteUrlResponse>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let key = request.key.unwrap_or_default();

    let (key, url) = app_state
        .uploads
        .mint_delete_url(&key, request.expires_in)
        .await?;

    Ok(Json(DeleteUrlResponse {
        key: key.into_string(),
        expires_in: url.expires_in().unwrap_or_default(),
        delete_url: url.url().to_string(),
    }))
}

/// 使用网关凭证删除对象
#[utoipa::path(
    delete,
    path = "/api/files",
    tag = "files",
    request_body = DeleteFileRequest,
    responses(
        (status = 200, description = "删除成功", body = DeleteFileResponse),
        (status = 400, description = "缺少或非法的key", body = crate::response::ErrorBody),
        (status = 404, description = "文件不存在", body = crate::response::ErrorBody),
        (status = 500, description = "存储后端错误", body = crate::response::ErrorBody)
    )
)]
pub async fn delete_file(
    State(app_state): State<AppState>,
    payload: Result<Json<DeleteFileRequest>, JsonRejection>,
) -> AppResult<Json<DeleteFileResponse>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let key = request.key.unwrap_or_default();

    let key = app_state.uploads.delete_by_key(&key).await?;
    tracing::info!("文件已删除: {}", key);

    Ok(Json(DeleteFileResponse {
        deleted: true,
        key: key.into_string(),
    }))
}

/// 通过网关签名链接删除对象
#[utoipa::path(
    delete,
    path = "/api/files/signed",
    tag = "files",
    params(SignedDeleteQuery),
    responses(
        (status = 200, description = "删除成功", body = DeleteFileResponse),
        (status = 400, description = "查询参数错误", body = crate::response::ErrorBody),
        (status = 403, description = "签名无效或已过期", body = crate::response::ErrorBody),
        (status = 404, description = "文件不存在", body = crate::response::ErrorBody),
        (status = 500, description = "存储后端错误", body = crate::response::ErrorBody)
    )
)]
pub async fn delete_signed(
    State(app_state): State<AppState>,
    query: Result<Query<SignedDeleteQuery>, QueryRejection>,
) -> AppResult<Json<DeleteFileResponse>> {
    let Query(query) = query
        .map_err(|e| AppError::bad_request(format!("Invalid query: {}", e.body_text())))?;

    app_state.signer.verify_delete(
        &query.key,
        query.expires,
        &query.signature,
        chrono::Utc::now(),
    )?;

    let key = app_state.uploads.delete_by_key(&query.key).await?;
    tracing::info!("文件已通过签名链接删除: {}", key);

    Ok(Json(DeleteFileResponse {
        deleted: true,
        key: key.into_string(),
    }))
}
