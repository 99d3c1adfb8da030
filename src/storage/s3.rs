use super::{Storage, StorageKind, StoredObject, Visibility, backend_error};
use crate::{
    config::S3Config,
    error::{AppError, AppResult},
    keys::{StorageKey, normalize_prefix},
};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{Client, config::Credentials, presigning::PresigningConfig, primitives::ByteStream};
use std::{sync::Arc, time::Duration};

/// S3兼容存储实现（MinIO、R2 等），使用路径样式寻址
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Arc<Client>,
    config: S3Config,
    key_prefix: String,
    public_base_url: String,
}

impl S3Storage {
    /// 创建新的S3存储实例
    pub async fn new(config: S3Config) -> AppResult<Self> {
        let key_prefix = normalize_prefix(&config.key_prefix)
            .map_err(|e| AppError::config(format!("S3_KEY_PREFIX: {}", e)))?;

        // 创建静态凭证
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,     // session token
            None,     // expiration
            "static", // provider name
        );

        // 构建S3配置
        let s3_config = aws_sdk_s3::Config::builder()
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(true) // 非AWS网关需要路径样式
            .behavior_version(BehaviorVersion::latest())
            .build();

        let client = Client::from_conf(s3_config);

        let public_base_url = match &config.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "{}/{}",
                config.endpoint.trim_end_matches('/'),
                config.bucket
            ),
        };

        Ok(Self {
            client: Arc::new(client),
            config,
            key_prefix,
            public_base_url,
        })
    }

    fn presigning_config(ttl: Duration) -> AppResult<PresigningConfig> {
        PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::signing(format!("invalid presigning configuration: {}", e)))
    }
}

#[async_trait::async_trait]
impl Storage for S3Storage {
    fn kind(&self) -> StorageKind {
        StorageKind::S3
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
        let result = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key.as_str())
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| backend_error("PutObject", e.into_service_error()))?;

        let etag = result.e_tag().unwrap_or("");
        tracing::info!(
            "成功上传文件到S3: {}/{}, ETag: {}",
            self.config.bucket,
            key,
            etag
        );

        Ok(StoredObject {
            kind: StorageKind::S3,
            container: self.config.bucket.clone(),
            key: key.clone(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, key: &StorageKey) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| backend_error("DeleteObject", e.into_service_error()))?;

        tracing::info!("成功删除文件: {}/{}", self.config.bucket, key);
        Ok(())
    }

    fn public_url(&self, key: &StorageKey) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn presign_get(&self, key: &StorageKey, ttl: Duration) -> AppResult<String> {
        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key.as_str())
            .presigned(Self::presigning_config(ttl)?)
            .await
            .map_err(|e| AppError::signing(format!("failed to presign GET URL: {}", e)))?;

        Ok(presigned_request.uri().to_string())
    }

    async fn presign_delete(&self, key: &StorageKey, ttl: Duration) -> AppResult<Option<String>> {
        let presigned_request = self
            .client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key.as_str())
            .presigned(Self::presigning_config(ttl)?)
            .await
            .map_err(|e| AppError::signing(format!("failed to presign DELETE URL: {}", e)))?;

        Ok(Some(presigned_request.uri().to_string()))
    }

    async fn health_check(&self) -> AppResult<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::error!("S3健康检查失败: {}", e);
                Ok(false)
            }
        }
    }
}
