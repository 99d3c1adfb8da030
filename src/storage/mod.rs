pub mod local;
pub mod managed;
pub mod s3;
pub mod signing;

pub use local::LocalStorage;
pub use managed::ManagedStorage;
pub use s3::S3Storage;
pub use signing::UrlSigner;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    keys::StorageKey,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, sync::Arc, time::Duration};
use utoipa::ToSchema;

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
    Managed,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::S3 => "s3",
            StorageKind::Managed => "managed",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "disk" => Ok(StorageKind::Local),
            "s3" | "minio" => Ok(StorageKind::S3),
            "managed" | "supabase" => Ok(StorageKind::Managed),
            other => Err(format!("expected one of local, s3, managed; got '{}'", other)),
        }
    }
}

/// 对象读取可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" | "true" => Ok(Visibility::Public),
            "private" | "false" => Ok(Visibility::Private),
            other => Err(format!("expected public or private; got '{}'", other)),
        }
    }
}

/// 写入成功后的对象描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: StorageKind,
    /// bucket名称，本地存储固定为 "local"，不暴露服务器路径
    pub container: String,
    pub key: StorageKey,
    pub size: u64,
    pub content_type: String,
}

/// 存储抽象接口
#[async_trait::async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    fn kind(&self) -> StorageKind;

    /// bucket / 容器标识
    fn container(&self) -> &str;

    fn visibility(&self) -> Visibility;

    /// 已规范化的键前缀
    fn key_prefix(&self) -> &str;

    /// 签名GET链接有效期（秒）
    fn get_url_ttl(&self) -> Duration;

    /// 写入对象，已存在的键会被覆盖
    async fn write(
        &self,
        key: &StorageKey,
        data: &[u8],
        content_type: &str,
    ) -> AppResult<StoredObject>;

    /// 删除对象
    async fn delete(&self, key: &StorageKey) -> AppResult<()>;

    /// 拼接公开访问URL，不发起网络请求
    fn public_url(&self, key: &StorageKey) -> String;

    /// 生成签名GET链接
    async fn presign_get(&self, key: &StorageKey, ttl: Duration) -> AppResult<String>;

    /// 生成后端原生的签名DELETE链接；后端不支持时返回 None，由网关自行签名
    async fn presign_delete(&self, key: &StorageKey, ttl: Duration) -> AppResult<Option<String>>;

    /// 健康检查
    async fn health_check(&self) -> AppResult<bool>;

    /// 需要由网关直接提供静态访问的本地目录
    fn local_root(&self) -> Option<&Path> {
        None
    }
}

/// 根据配置创建存储后端，启动时调用一次
pub async fn build_storage(config: &Config) -> AppResult<Arc<dyn Storage>> {
    let timeout = Duration::from_secs(config.storage.timeout_secs);

    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageKind::Local => Arc::new(LocalStorage::from_config(
            &config.storage.local,
            &config.public_base_url(),
        )?),
        StorageKind::S3 => Arc::new(S3Storage::new(config.storage.s3.clone()).await?),
        StorageKind::Managed => {
            Arc::new(ManagedStorage::new(config.storage.managed.clone(), timeout)?)
        }
    };

    tracing::info!(
        "存储后端已初始化: {} (容器: {}, 可见性: {:?})",
        storage.kind(),
        storage.container(),
        storage.visibility()
    );

    Ok(storage)
}

/// 将后端错误文本统一包装为存储错误
pub(crate) fn backend_error<E: fmt::Display>(operation: &str, err: E) -> AppError {
    AppError::storage(format!("{} failed: {}", operation, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("local".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!("S3".parse::<StorageKind>().unwrap(), StorageKind::S3);
        assert_eq!(
            "supabase".parse::<StorageKind>().unwrap(),
            StorageKind::Managed
        );
        assert!("ftp".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!("false".parse::<Visibility>().unwrap(), Visibility::Private);
        assert!("hidden".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(StorageKind::Managed).unwrap(),
            serde_json::json!("managed")
        );
    }
}
