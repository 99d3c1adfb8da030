//! 托管对象存储（Supabase Storage 兼容的 REST 接口）
//!
//! 上传使用 upsert 语义，覆盖已存在的键不视为错误。

use super::{Storage, StorageKind, StoredObject, Visibility, backend_error};
use crate::{
    config::ManagedConfig,
    error::{AppError, AppResult},
    keys::{StorageKey, normalize_prefix},
};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

/// 托管存储实现
#[derive(Debug, Clone)]
pub struct ManagedStorage {
    client: Client,
    config: ManagedConfig,
    /// `<url>/storage/v1`
    api_base: String,
    key_prefix: String,
}

impl ManagedStorage {
    pub fn new(config: ManagedConfig, timeout: Duration) -> AppResult<Self> {
        let key_prefix = normalize_prefix(&config.key_prefix)
            .map_err(|e| AppError::config(format!("MANAGED_KEY_PREFIX: {}", e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::config(format!("创建HTTP客户端失败: {}", e)))?;

        let api_base = format!("{}/storage/v1", config.url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            api_base,
            key_prefix,
        })
    }

    fn object_url(&self, key: &StorageKey) -> String {
        format!("{}/object/{}/{}", self.api_base, self.config.bucket, key)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
    }

    /// 非2xx响应转换为存储错误，保留后端返回的错误文本
    async fn error_from_response(operation: &str, response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        backend_error(operation, format!("{} {}", status, body.trim()))
    }
}

fn is_not_found(status: StatusCode, body: &str) -> bool {
    // 部分版本对不存在的对象返回 400 + not_found
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("not_found"))
}

#[async_trait::async_trait]
impl Storage for ManagedStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Managed
    }

    fn container(&self) -> &str {
        &self.config.bucket
    }

    fn visibility(&self) -> Visibility {
        self.config.visibility
    }

    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn get_url_ttl(&self) -> Duration {
        Duration::from_secs(self.config.signed_url_ttl_secs)
    }

    async fn write(
        &self,
        key: &StorageKey,
        data: &[u8],
        content_type: &str,
    ) -> AppResult<StoredObject> {
        let response = self
            .authorized(self.client.post(self.object_url(key)))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| backend_error("upload", e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response("upload", response).await);
        }

        tracing::info!(
            "成功上传文件到托管存储: {}/{} ({} 字节)",
            self.config.bucket,
            key,
            data.len()
        );

        Ok(StoredObject {
            kind: StorageKind::Managed,
            container: self.config.bucket.clone(),
            key: key.clone(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, key: &StorageKey) -> AppResult<()> {
        let response = self
            .authorized(self.client.delete(self.object_url(key)))
            .send()
            .await
            .map_err(|e| backend_error("delete", e))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("成功删除文件: {}/{}", self.config.bucket, key);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body) {
            return Err(AppError::file_not_found(key.as_str()));
        }
        Err(backend_error("delete", format!("{} {}", status, body.trim())))
    }

    fn public_url(&self, key: &StorageKey) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.api_base, self.config.bucket, key
        )
    }

    async fn presign_get(&self, key: &StorageKey, ttl: Duration) -> AppResult<String> {
        let url = format!(
            "{}/object/sign/{}/{}",
            self.api_base, self.config.bucket, key
        );

        let response = self
            .authorized(self.client.post(url))
            .json(&SignRequest {
                expires_in: ttl.as_secs(),
            })
            .send()
            .await
            .map_err(|e| AppError::signing(format!("failed to sign URL: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::signing(format!(
                "failed to sign URL: {} {}",
                status,
                body.trim()
            )));
        }

        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| AppError::signing(format!("invalid sign response: {}", e)))?;

        if signed.signed_url.starts_with("http://") || signed.signed_url.starts_with("https://") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}{}", self.api_base, signed.signed_url))
        }
    }

    async fn presign_delete(&self, _key: &StorageKey, _ttl: Duration) -> AppResult<Option<String>> {
        // 托管服务没有签名删除，由网关签名
        Ok(None)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let url = format!("{}/bucket/{}", self.api_base, self.config.bucket);
        match self.authorized(self.client.get(url)).send().await {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                tracing::error!("托管存储健康检查失败: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                tracing::error!("托管存储健康检查失败: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::validate_key;
    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, State},
        http::HeaderMap,
        routing::post,
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

    const SERVICE_KEY: &str = "service-role-key";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some("Bearer service-role-key")
    }

    async fn upload(
        State(objects): State<Objects>,
        Path((bucket, key)): Path<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED;
        }
        assert_eq!(headers.get("x-upsert").unwrap(), "true");
        objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, key), body.to_vec());
        StatusCode::OK
    }

    async fn remove(
        State(objects): State<Objects>,
        Path((bucket, key)): Path<(String, String)>,
    ) -> (StatusCode, String) {
        match objects.lock().unwrap().remove(&format!("{}/{}", bucket, key)) {
            Some(_) => (StatusCode::OK, "{}".to_string()),
            None => (
                StatusCode::BAD_REQUEST,
                r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#
                    .to_string(),
            ),
        }
    }

    async fn sign(
        Path((bucket, key)): Path<(String, String)>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "signedURL": format!(
                "/object/sign/{}/{}?token=t-{}",
                bucket, key, body["expiresIn"]
            )
        }))
    }

    async fn spawn_stub() -> (String, Objects) {
        let objects: Objects = Arc::default();
        let app = Router::new()
            .route(
                "/storage/v1/object/{bucket}/{*key}",
                post(upload).delete(remove),
            )
            .route("/storage/v1/object/sign/{bucket}/{*key}", post(sign))
            .with_state(objects.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), objects)
    }

    fn storage(url: &str) -> ManagedStorage {
        ManagedStorage::new(
            ManagedConfig {
                url: url.to_string(),
                service_key: SERVICE_KEY.to_string(),
                bucket: "images".to_string(),
                ..ManagedConfig::default()
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_public_url() {
        let storage = storage("https://project.example.co/");
        let key = validate_key("uploads/x.png").unwrap();
        assert_eq!(
            storage.public_url(&key),
            "https://project.example.co/storage/v1/object/public/images/uploads/x.png"
        );
    }

    #[tokio::test]
    async fn test_upload_sign_and_delete_against_stub() {
        let (url, objects) = spawn_stub().await;
        let storage = storage(&url);
        let key = validate_key("uploads/1-abc-x.png").unwrap();

        let stored = storage.write(&key, b"img", "image/png").await.unwrap();
        assert_eq!(stored.container, "images");
        assert_eq!(
            objects.lock().unwrap().get("images/uploads/1-abc-x.png").unwrap(),
            b"img"
        );

        // upsert：重复写入不报错
        storage.write(&key, b"img2", "image/png").await.unwrap();

        let signed = storage
            .presign_get(&key, Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(
            signed,
            format!(
                "{}/storage/v1/object/sign/images/uploads/1-abc-x.png?token=t-120",
                url
            )
        );

        storage.delete(&key).await.unwrap();
        let err = storage.delete(&key).await.unwrap_err();
        assert!(matches!(err, AppError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_backend_message() {
        let (url, _objects) = spawn_stub().await;
        let mut storage = storage(&url);
        storage.config.service_key = "wrong".to_string();
        let key = validate_key("uploads/x.png").unwrap();

        let err = storage.write(&key, b"img", "image/png").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(err.to_string().contains("401"));
    }
}
