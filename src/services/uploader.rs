//! 上传编排
//!
//! 每个请求独立创建一次处理流程：校验 -> 逐个文件（生成键 -> 写入后端 -> 签发URL）-> 汇总。
//! 文件按到达顺序串行处理；批量上传中任一文件失败即终止整个批次，不返回部分结果。
//! 已经写入的文件不会回滚。

use crate::{
    config::Config,
    error::{AppError, AppResult},
    keys::{EntropySource, StorageKey, SystemEntropy, build_key, validate_key},
    storage::{Storage, StorageKind, UrlSigner, Visibility},
    urls::{AccessUrl, UrlIssuer},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use utoipa::ToSchema;

const OCTET_STREAM: &str = "application/octet-stream";

/// 请求中解析出的单个文件，仅在请求处理期间存在
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// 客户端提供的文件名（不可信）
    pub original_name: Option<String>,
    /// 客户端声明的MIME类型（不可信）
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// 单个文件的上传结果
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadDescriptor {
    /// 存储后端类型
    pub storage: StorageKind,
    /// bucket / 容器
    pub bucket: String,
    /// 存储键，删除时使用
    pub key: String,
    /// 文件大小（字节）
    pub size: u64,
    pub content_type: String,
    /// 读取地址
    pub url: String,
    /// 限时签名删除地址
    pub delete_url: String,
    pub visibility: Visibility,
    /// 读取地址有效期（秒），公开地址不返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_expires_in: Option<u64>,
    pub delete_url_expires_in: u64,
}

/// 处理阶段，用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    Validating,
    PerFileProcessing,
    Aggregating,
    Responded,
}

/// 上传编排服务
#[derive(Debug, Clone)]
pub struct UploadService {
    storage: Arc<dyn Storage>,
    issuer: UrlIssuer,
    entropy: Arc<dyn EntropySource>,
    images_only: bool,
    timeout: Duration,
}

impl UploadService {
    pub fn new(storage: Arc<dyn Storage>, signer: Arc<UrlSigner>, config: &Config) -> Self {
        let issuer = UrlIssuer::new(
            storage.clone(),
            signer,
            config.storage.delete_url_ttl_secs,
        );

        Self {
            storage,
            issuer,
            entropy: Arc::new(SystemEntropy),
            images_only: config.upload.images_only,
            timeout: Duration::from_secs(config.storage.timeout_secs),
        }
    }

    /// 替换键的唯一性来源
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// 单文件上传
    pub async fn upload_one(&self, file: UploadedFile) -> AppResult<UploadDescriptor> {
        self.upload_batch(vec![file])
            .await?
            .pop()
            .ok_or_else(|| AppError::validation("No file uploaded"))
    }

    /// 批量上传，全部成功或整体失败
    pub async fn upload_batch(&self, files: Vec<UploadedFile>) -> AppResult<Vec<UploadDescriptor>> {
        trace_stage(UploadStage::Received, files.len());

        trace_stage(UploadStage::Validating, files.len());
        if files.is_empty() {
            return Err(AppError::validation("No file uploaded"));
        }
        // 写入前先校验整个批次，类型不符的批次不会产生任何写入
        let prepared = files
            .into_iter()
            .map(|file| {
                let content_type = self.resolve_content_type(&file)?;
                Ok((file, content_type))
            })
            .collect::<AppResult<Vec<_>>>()?;

        trace_stage(UploadStage::PerFileProcessing, prepared.len());
        let total = prepared.len();
        let mut descriptors = Vec::with_capacity(total);
        for (index, (file, content_type)) in prepared.into_iter().enumerate() {
            let descriptor = self
                .process_file(&file, &content_type)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        "第 {}/{} 个文件处理失败，终止本批次: {}",
                        index + 1,
                        total,
                        e
                    );
                })?;
            descriptors.push(descriptor);
        }

        trace_stage(UploadStage::Aggregating, descriptors.len());
        trace_stage(UploadStage::Responded, descriptors.len());
        Ok(descriptors)
    }

    async fn process_file(
        &self,
        file: &UploadedFile,
        content_type: &str,
    ) -> AppResult<UploadDescriptor> {
        let key = build_key(
            self.storage.key_prefix(),
            file.original_name.as_deref(),
            self.entropy.as_ref(),
        );

        let stored = self
            .with_timeout("write", self.storage.write(&key, &file.data, content_type))
            .await?;

        let visibility = self.storage.visibility();
        let get_url = self
            .with_timeout("sign GET URL", self.issuer.issue_get_url(&key, visibility))
            .await?;
        let delete_url = self
            .with_timeout("sign DELETE URL", self.issuer.issue_delete_url(&key, None))
            .await?;

        Ok(UploadDescriptor {
            storage: stored.kind,
            bucket: stored.container,
            key: stored.key.into_string(),
            size: stored.size,
            content_type: stored.content_type,
            url: get_url.url().to_string(),
            visibility,
            url_expires_in: get_url.expires_in(),
            delete_url_expires_in: delete_url.expires_in().unwrap_or_default(),
            delete_url: delete_url.url().to_string(),
        })
    }

    /// 为已有的键重新签发删除链接
    pub async fn mint_delete_url(
        &self,
        key: &str,
        ttl_secs: Option<u64>,
    ) -> AppResult<(StorageKey, AccessUrl)> {
        let key = validate_key(key)?;
        let url = self
            .with_timeout("sign DELETE URL", self.issuer.issue_delete_url(&key, ttl_secs))
            .await?;
        Ok((key, url))
    }

    /// 网关使用自身凭证直接删除
    pub async fn delete_by_key(&self, key: &str) -> AppResult<StorageKey> {
        let key = validate_key(key)?;
        self.with_timeout("delete", self.storage.delete(&key))
            .await?;
        Ok(key)
    }

    /// 确定存储使用的MIME类型：识别出的类型 > 客户端声明 > octet-stream
    fn resolve_content_type(&self, file: &UploadedFile) -> AppResult<String> {
        let sniffed = infer::get(&file.data).map(|kind| kind.mime_type().to_string());
        let declared = file
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty() && *ct != OCTET_STREAM)
            .map(str::to_string);

        let content_type = sniffed
            .or(declared)
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        if self.images_only && !content_type.starts_with("image/") {
            return Err(AppError::unsupported_file_type(content_type));
        }

        Ok(content_type)
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| AppError::timeout(operation, self.timeout.as_secs()))?
    }
}

fn trace_stage(stage: UploadStage, files: usize) {
    tracing::debug!(?stage, files, "上传处理阶段");
}
