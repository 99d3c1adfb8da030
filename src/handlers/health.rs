use crate::{
    error::{AppError, AppResult},
    handlers::AppState,
    storage::StorageKind,
};
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HealthQuery {
    /// 为 true 时附带存储后端连通性检查结果
    #[serde(default)]
    pub detail: bool,
}

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub storage: StorageKind,
    /// 存储后端是否可达，仅 `detail=true` 时返回
    #[serde(rename = "storageHealthy", skip_serializing_if = "Option::is_none")]
    pub storage_healthy: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// 健康检查
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    params(HealthQuery),
    responses(
        (status = 200, description = "服务存活", body = HealthResponse),
        (status = 400, description = "查询参数错误", body = crate::response::ErrorBody)
    )
)]
pub async fn health_check(
    State(app_state): State<AppState>,
    query: Result<Query<HealthQuery>, QueryRejection>,
) -> AppResult<Json<HealthResponse>> {
    let Query(params) = query
        .map_err(|e| AppError::bad_request(format!("Invalid query: {}", e.body_text())))?;

    let storage_healthy = if params.detail {
        match app_state.storage.health_check().await {
            Ok(healthy) => Some(healthy),
            Err(e) => {
                tracing::error!("存储健康检查失败: {}", e);
                Some(false)
            }
        }
    } else {
        None
    };

    Ok(Json(HealthResponse {
        ok: true,
        storage: app_state.storage.kind(),
        storage_healthy,
    }))
}

/// 就绪检查：进程开始监听即表示存储已完成初始化
#[utoipa::path(
    get,
    path = "/api/ready",
    tag = "health",
    responses(
        (status = 200, description = "服务就绪", body = ReadyResponse)
    )
)]
pub async fn readiness() -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: true })
}
