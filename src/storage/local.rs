//! 本地磁盘存储
//!
//! 文件写入 `base_dir/key`，通过静态文件服务挂载在 [`ASSETS_ROUTE`] 下对外提供。
//! 该后端不保证持久性：重新部署后数据可能丢失，换来的是零外部依赖。

use super::{Storage, StorageKind, StoredObject, Visibility, backend_error};
use crate::{
    config::LocalConfig,
    error::{AppError, AppResult},
    keys::{StorageKey, normalize_prefix},
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

/// 本地文件的静态访问路径前缀
pub const ASSETS_ROUTE: &str = "/assets/uploads";

const CONTAINER_NAME: &str = "local";
const CWD_SUBDIR: &str = "uploads";
const TEMP_SUBDIR: &str = "upload-gateway";

/// 本地存储实现
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
    key_prefix: String,
    public_base_url: String,
}

impl LocalStorage {
    /// 按候选目录顺序探测可写目录并创建实例
    pub fn from_config(config: &LocalConfig, public_base_url: &str) -> AppResult<Self> {
        let candidates = candidate_dirs(config.upload_dir.as_deref());
        let base_dir = first_writable_dir(&candidates)?;
        tracing::info!("本地存储目录: {}", base_dir.display());
        tracing::warn!("本地存储为临时存储，重新部署后已上传文件可能丢失");

        Self::new(base_dir, &config.key_prefix, public_base_url)
    }

    pub fn new(base_dir: PathBuf, key_prefix: &str, public_base_url: &str) -> AppResult<Self> {
        let key_prefix = normalize_prefix(key_prefix)
            .map_err(|e| AppError::config(format!("LOCAL_KEY_PREFIX: {}", e)))?;

        Ok(Self {
            base_dir,
            key_prefix,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, key: &StorageKey) -> PathBuf {
        key.as_str()
            .split('/')
            .fold(self.base_dir.clone(), |path, segment| path.join(segment))
    }
}

/// 候选目录：显式配置 > 工作目录下的子目录 > 系统临时目录
pub fn candidate_dirs(explicit: Option<&str>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = explicit.filter(|d| !d.trim().is_empty()) {
        dirs.push(PathBuf::from(dir));
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join(CWD_SUBDIR));
    }
    dirs.push(std::env::temp_dir().join(TEMP_SUBDIR));
    dirs
}

/// 返回第一个可写的目录，全部不可写时启动失败
pub fn first_writable_dir(candidates: &[PathBuf]) -> AppResult<PathBuf> {
    for dir in candidates {
        match check_writable(dir) {
            Ok(()) => return Ok(dir.clone()),
            Err(e) => tracing::warn!("目录不可写，跳过: {} ({})", dir.display(), e),
        }
    }

    let tried = candidates
        .iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(AppError::config(format!(
        "no writable upload directory found (tried: {})",
        tried
    )))
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let marker = dir.join(format!(".write-check-{}", std::process::id()));
    std::fs::write(&marker, b"ok")?;
    std::fs::remove_file(&marker)
}

/// 写入中的临时文件，未提交前被丢弃时删除
///
/// 超时会直接丢弃 `write` 的 future，此时只能依赖 `Drop` 清理。
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn for_target(target: &Path) -> Self {
        let mut path = target.as_os_str().to_os_string();
        path.push(format!(".partial-{}", std::process::id()));
        Self {
            path: PathBuf::from(path),
            committed: false,
        }
    }

    async fn commit(mut self, target: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("已清理临时文件: {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("临时文件清理失败: {} ({})", self.path.display(), e),
        }
    }
}

#[async_trait::async_trait]
impl Storage for LocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    fn container(&self) -> &str {
        CONTAINER_NAME
    }

    fn visibility(&self) -> Visibility {
        Visibility::Public
    }

    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn get_url_ttl(&self) -> Duration {
        Duration::ZERO
    }

    async fn write(
        &self,
        key: &StorageKey,
        data: &[u8],
        content_type: &str,
    ) -> AppResult<StoredObject> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| backend_error("create upload directory", e))?;
        }

        // 先写临时文件再重命名，避免静态服务读到写了一半的文件
        let partial = PartialFile::for_target(&path);
        tokio::fs::write(&partial.path, data)
            .await
            .map_err(|e| backend_error("write file", e))?;
        partial
            .commit(&path)
            .await
            .map_err(|e| backend_error("write file", e))?;

        tracing::info!("成功写入本地文件: {} ({} 字节)", key, data.len());

        Ok(StoredObject {
            kind: StorageKind::Local,
            container: CONTAINER_NAME.to_string(),
            key: key.clone(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, key: &StorageKey) -> AppResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                tracing::info!("成功删除本地文件: {}", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::file_not_found(key.as_str())),
            Err(e) => Err(backend_error("delete file", e)),
        }
    }

    fn public_url(&self, key: &StorageKey) -> String {
        format!("{}{}/{}", self.public_base_url, ASSETS_ROUTE, key)
    }

    async fn presign_get(&self, key: &StorageKey, _ttl: Duration) -> AppResult<String> {
        // 本地文件始终公开
        Ok(self.public_url(key))
    }

    async fn presign_delete(&self, _key: &StorageKey, _ttl: Duration) -> AppResult<Option<String>> {
        Ok(None)
    }

    async fn health_check(&self) -> AppResult<bool> {
        match tokio::fs::metadata(&self.base_dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) => {
                tracing::error!("本地存储健康检查失败: {}", e);
                Ok(false)
            }
        }
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.base_dir)
    }
}
