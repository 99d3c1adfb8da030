//! 测试辅助：样例文件、本地存储构造、故障注入存储

use crate::{
    config::{Config, DEFAULT_GET_URL_TTL_SECS},
    error::{AppError, AppResult},
    handlers::AppState,
    keys::StorageKey,
    services::UploadedFile,
    storage::{LocalStorage, Storage, StorageKind, StoredObject, UrlSigner, Visibility},
};
use bytes::Bytes;
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;

pub const BASE_URL: &str = "http://localhost:3000";
pub const MULTIPART_BOUNDARY: &str = "----upload-gateway-test-boundary";

/// 最小的PNG文件头
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00\x1f\x15\xc4\x89";

/// 最小的GIF文件头
pub const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.public_base_url = Some(BASE_URL.to_string());
    config
}

pub fn local_storage(dir: &TempDir) -> LocalStorage {
    LocalStorage::new(dir.path().to_path_buf(), "", BASE_URL).unwrap()
}

pub fn png_file(name: &str) -> UploadedFile {
    UploadedFile {
        original_name: Some(name.to_string()),
        content_type: Some("image/png".to_string()),
        data: Bytes::from_static(PNG_BYTES),
    }
}

pub fn test_signer() -> Arc<UrlSigner> {
    Arc::new(UrlSigner::new(b"test-secret", BASE_URL))
}

pub fn test_state(config: Config, storage: Arc<dyn Storage>) -> AppState {
    AppState::new(Arc::new(config), storage, test_signer())
}

/// multipart请求体中的一个文件字段
pub struct Part<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn png(field: &'a str, filename: &'a str) -> Self {
        Self {
            field,
            filename,
            content_type: "image/png",
            data: PNG_BYTES,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.field, part.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY)
}

/// 包装本地存储，用于注入故障
///
/// 可以让第N次写入失败、给每次写入加延迟、改为私有可见性，或让GET签名失败。
#[derive(Debug)]
pub struct FaultyStorage {
    inner: LocalStorage,
    fail_on: Option<usize>,
    delay: Option<Duration>,
    private: bool,
    fail_presign_get: bool,
    writes: AtomicUsize,
}

impl FaultyStorage {
    /// 第 `n` 次写入（从1开始）失败
    pub fn failing_on(inner: LocalStorage, n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::never_failing(inner)
        }
    }

    pub fn never_failing(inner: LocalStorage) -> Self {
        Self {
            inner,
            fail_on: None,
            delay: None,
            private: false,
            fail_presign_get: false,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 以私有可见性对外呈现，GET链接走签名流程
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn failing_presign_get(mut self) -> Self {
        self.fail_presign_get = true;
        self
    }

    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Storage for FaultyStorage {
    fn kind(&self) -> StorageKind {
        self.inner.kind()
    }

    fn container(&self) -> &str {
        self.inner.container()
    }

    fn visibility(&self) -> Visibility {
        if self.private {
            Visibility::Private
        } else {
            self.inner.visibility()
        }
    }

    fn key_prefix(&self) -> &str {
        self.inner.key_prefix()
    }

    fn get_url_ttl(&self) -> Duration {
        if self.private {
            Duration::from_secs(DEFAULT_GET_URL_TTL_SECS)
        } else {
            self.inner.get_url_ttl()
        }
    }

    async fn write(
        &self,
        key: &StorageKey,
        data: &[u8],
        content_type: &str,
    ) -> AppResult<StoredObject> {
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on == Some(attempt) {
            return Err(AppError::storage("simulated backend fault"));
        }
        self.inner.write(key, data, content_type).await
    }

    async fn delete(&self, key: &StorageKey) -> AppResult<()> {
        self.inner.delete(key).await
    }

    fn public_url(&self, key: &StorageKey) -> String {
        self.inner.public_url(key)
    }

    async fn presign_get(&self, key: &StorageKey, ttl: Duration) -> AppResult<String> {
        if self.fail_presign_get {
            return Err(AppError::signing("simulated signing fault"));
        }
        let url = self.inner.presign_get(key, ttl).await?;
        if self.private {
            Ok(format!("{}?expires_in={}", url, ttl.as_secs()))
        } else {
            Ok(url)
        }
    }

    async fn presign_delete(&self, key: &StorageKey, ttl: Duration) -> AppResult<Option<String>> {
        self.inner.presign_delete(key, ttl).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    fn local_root(&self) -> Option<&Path> {
        self.inner.local_root()
    }
}
