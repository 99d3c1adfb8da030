use crate::error::{AppError, AppResult};
use crate::keys::normalize_prefix;
use crate::storage::{StorageKind, Visibility};
use crate::urls::{MAX_DELETE_URL_TTL_SECS, MIN_DELETE_URL_TTL_SECS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// 默认签名GET链接有效期：7天
pub const DEFAULT_GET_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;
/// 默认签名DELETE链接有效期：10分钟
pub const DEFAULT_DELETE_URL_TTL_SECS: u64 = 600;
/// S3预签名链接的最长有效期：7天
pub const MAX_S3_SIGNED_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;
/// 托管存储签名链接的最长有效期：1年
pub const MAX_MANAGED_SIGNED_URL_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// 应用程序配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 对外可访问的网关地址，用于拼接本地文件URL和网关签名的删除URL
    pub public_base_url: Option<String>,
    /// 允许的Origin列表，空列表表示全部允许
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: None,
            allowed_origins: Vec::new(),
        }
    }
}

/// 上传限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_size_mb: u64,
    /// 多文件上传单次最多文件数
    pub max_files: usize,
    /// 仅允许 image/* 类型
    pub images_only: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 10,
            max_files: 10,
            images_only: true,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    /// 单次后端调用超时（秒）
    pub timeout_secs: u64,
    pub delete_url_ttl_secs: u64,
    /// 网关签名URL所用密钥，未配置时进程启动时随机生成
    pub signing_secret: Option<String>,
    pub local: LocalConfig,
    pub s3: S3Config,
    pub managed: ManagedConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Local,
            timeout_secs: 30,
            delete_url_ttl_secs: DEFAULT_DELETE_URL_TTL_SECS,
            signing_secret: None,
            local: LocalConfig::default(),
            s3: S3Config::default(),
            managed: ManagedConfig::default(),
        }
    }
}

/// 本地磁盘存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub upload_dir: Option<String>,
    pub key_prefix: String,
}

/// S3兼容存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub key_prefix: String,
    /// 公开访问地址，未配置时使用 endpoint
    pub public_base_url: Option<String>,
    pub visibility: Visibility,
    pub signed_url_ttl_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            key_prefix: "uploads".to_string(),
            public_base_url: None,
            visibility: Visibility::Private,
            signed_url_ttl_secs: DEFAULT_GET_URL_TTL_SECS,
        }
    }
}

/// 托管对象存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub key_prefix: String,
    pub visibility: Visibility,
    pub signed_url_ttl_secs: u64,
}

impl Default for ManagedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_key: String::new(),
            bucket: String::new(),
            key_prefix: "uploads".to_string(),
            visibility: Visibility::Private,
            signed_url_ttl_secs: DEFAULT_GET_URL_TTL_SECS,
        }
    }
}

impl Config {
    /// 加载配置：可选的TOML文件 + 环境变量覆盖，最后统一校验
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            tracing::info!("已加载配置文件: {}", path);
            Self::from_file(&path)?
        } else {
            tracing::debug!("未找到配置文件 {}，使用默认配置", path);
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| AppError::config(format!("解析配置文件失败: {}", e)))
    }

    /// 用环境变量覆盖配置项，空值视为未设置
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        set_string(&mut self.server.host, get("HOST"));
        set_parsed(&mut self.server.port, get("PORT"), "PORT")?;
        if let Some(url) = get("PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(url);
        }
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        set_parsed(&mut self.upload.max_size_mb, get("MAX_UPLOAD_MB"), "MAX_UPLOAD_MB")?;
        set_parsed(&mut self.upload.max_files, get("MAX_FILES"), "MAX_FILES")?;
        set_parsed(&mut self.upload.images_only, get("IMAGES_ONLY"), "IMAGES_ONLY")?;

        let storage = &mut self.storage;
        set_parsed(&mut storage.backend, get("STORAGE_BACKEND"), "STORAGE_BACKEND")?;
        set_parsed(
            &mut storage.timeout_secs,
            get("STORAGE_TIMEOUT_SECS"),
            "STORAGE_TIMEOUT_SECS",
        )?;
        set_parsed(
            &mut storage.delete_url_ttl_secs,
            get("DELETE_URL_TTL_SECS"),
            "DELETE_URL_TTL_SECS",
        )?;
        if let Some(secret) = get("URL_SIGNING_SECRET") {
            storage.signing_secret = Some(secret);
        }

        if let Some(dir) = get("LOCAL_UPLOAD_DIR") {
            storage.local.upload_dir = Some(dir);
        }
        set_string(&mut storage.local.key_prefix, get("LOCAL_KEY_PREFIX"));

        let s3 = &mut storage.s3;
        set_string(&mut s3.endpoint, get("S3_ENDPOINT"));
        set_string(&mut s3.region, get("S3_REGION"));
        set_string(&mut s3.bucket, get("S3_BUCKET"));
        set_string(&mut s3.access_key_id, get("S3_ACCESS_KEY_ID"));
        set_string(&mut s3.secret_access_key, get("S3_SECRET_ACCESS_KEY"));
        set_string(&mut s3.key_prefix, get("S3_KEY_PREFIX"));
        if let Some(url) = get("S3_PUBLIC_BASE_URL") {
            s3.public_base_url = Some(url);
        }
        set_parsed(&mut s3.visibility, get("S3_VISIBILITY"), "S3_VISIBILITY")?;
        set_parsed(
            &mut s3.signed_url_ttl_secs,
            get("S3_SIGNED_URL_TTL_SECS"),
            "S3_SIGNED_URL_TTL_SECS",
        )?;

        let managed = &mut storage.managed;
        set_string(&mut managed.url, get("MANAGED_URL"));
        set_string(&mut managed.service_key, get("MANAGED_SERVICE_KEY"));
        set_string(&mut managed.bucket, get("MANAGED_BUCKET"));
        set_string(&mut managed.key_prefix, get("MANAGED_KEY_PREFIX"));
        set_parsed(
            &mut managed.visibility,
            get("MANAGED_VISIBILITY"),
            "MANAGED_VISIBILITY",
        )?;
        set_parsed(
            &mut managed.signed_url_ttl_secs,
            get("MANAGED_SIGNED_URL_TTL_SECS"),
            "MANAGED_SIGNED_URL_TTL_SECS",
        )?;

        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::config("PORT must not be 0"));
        }

        if self.upload.max_size_mb == 0 {
            return Err(AppError::config("MAX_UPLOAD_MB must be greater than 0"));
        }

        if self.upload.max_files == 0 {
            return Err(AppError::config("MAX_FILES must be greater than 0"));
        }

        if self.storage.timeout_secs == 0 {
            return Err(AppError::config(
                "STORAGE_TIMEOUT_SECS must be greater than 0",
            ));
        }

        if !(MIN_DELETE_URL_TTL_SECS..=MAX_DELETE_URL_TTL_SECS)
            .contains(&self.storage.delete_url_ttl_secs)
        {
            return Err(AppError::config(format!(
                "DELETE_URL_TTL_SECS must be between {} and {}",
                MIN_DELETE_URL_TTL_SECS, MAX_DELETE_URL_TTL_SECS
            )));
        }

        let storage = &self.storage;
        match storage.backend {
            StorageKind::Local => {
                normalize_prefix(&storage.local.key_prefix)
                    .map_err(|e| AppError::config(format!("LOCAL_KEY_PREFIX: {}", e)))?;
            }
            StorageKind::S3 => {
                let s3 = &storage.s3;
                require(&s3.endpoint, "S3_ENDPOINT", storage.backend)?;
                require(&s3.bucket, "S3_BUCKET", storage.backend)?;
                require(&s3.access_key_id, "S3_ACCESS_KEY_ID", storage.backend)?;
                require(&s3.secret_access_key, "S3_SECRET_ACCESS_KEY", storage.backend)?;
                normalize_prefix(&s3.key_prefix)
                    .map_err(|e| AppError::config(format!("S3_KEY_PREFIX: {}", e)))?;
                check_ttl(
                    s3.signed_url_ttl_secs,
                    MAX_S3_SIGNED_URL_TTL_SECS,
                    "S3_SIGNED_URL_TTL_SECS",
                )?;
            }
            StorageKind::Managed => {
                let managed = &storage.managed;
                require(&managed.url, "MANAGED_URL", storage.backend)?;
                require(&managed.service_key, "MANAGED_SERVICE_KEY", storage.backend)?;
                require(&managed.bucket, "MANAGED_BUCKET", storage.backend)?;
                normalize_prefix(&managed.key_prefix)
                    .map_err(|e| AppError::config(format!("MANAGED_KEY_PREFIX: {}", e)))?;
                check_ttl(
                    managed.signed_url_ttl_secs,
                    MAX_MANAGED_SIGNED_URL_TTL_SECS,
                    "MANAGED_SIGNED_URL_TTL_SECS",
                )?;
            }
        }

        Ok(())
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 对外地址（不含结尾斜杠）
    pub fn public_base_url(&self) -> String {
        match &self.server.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }

    /// 单文件最大字节数
    pub fn max_upload_bytes(&self) -> usize {
        (self.upload.max_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

fn set_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_parsed<T>(target: &mut T, value: Option<String>, key: &str) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = value {
        *target = raw
            .parse()
            .map_err(|e| AppError::config(format!("invalid value for {}: {} ({})", key, raw, e)))?;
    }
    Ok(())
}

fn require(value: &str, key: &str, backend: StorageKind) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::config(format!(
            "missing required variable {} for the {} storage backend",
            key, backend
        )));
    }
    Ok(())
}

fn check_ttl(secs: u64, max: u64, key: &str) -> AppResult<()> {
    if !(1..=max).contains(&secs) {
        return Err(AppError::config(format!(
            "{} must be between 1 and {}",
            key, max
        )));
    }
    Ok(())
}
