//! 存储键生成与校验
//!
//! 键格式：`[prefix/]<毫秒时间戳>-<随机后缀>-<清洗后的文件名>`。
//! 文件名部分只包含 `[A-Za-z0-9._-]`，`/` 只可能来自配置的前缀。

use crate::error::{AppError, AppResult};
use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use std::fmt;

/// 键的最大长度（S3对象键上限）
pub const MAX_KEY_LEN: usize = 1024;

const FALLBACK_NAME: &str = "file";
const RANDOM_SUFFIX_LEN: usize = 6;

/// 存储键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 键唯一性来源
pub trait EntropySource: Send + Sync + fmt::Debug {
    /// 当前毫秒时间戳
    fn now_millis(&self) -> i64;
    /// 随机后缀，只能包含字母数字
    fn random_suffix(&self) -> String;
}

/// 系统时钟 + 线程本地随机数
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEntropy;

impl EntropySource for SystemEntropy {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn random_suffix(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect()
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// 清洗客户端提供的文件名
pub fn sanitize_filename(name: Option<&str>) -> String {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    name.chars()
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect()
}

/// 规范化配置的前缀：去掉首尾及重复的 `/`，拒绝非法字符和 `.`/`..` 段
pub fn normalize_prefix(prefix: &str) -> AppResult<String> {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();

    for segment in &segments {
        if *segment == "." || *segment == ".." {
            return Err(AppError::validation(format!(
                "prefix must not contain '{}' segments",
                segment
            )));
        }
        if !segment.chars().all(is_key_char) {
            return Err(AppError::validation(format!(
                "prefix segment '{}' contains characters outside [A-Za-z0-9._-]",
                segment
            )));
        }
    }

    Ok(segments.join("/"))
}

/// 生成存储键
pub fn build_key(
    prefix: &str,
    original_filename: Option<&str>,
    entropy: &dyn EntropySource,
) -> StorageKey {
    let name = sanitize_filename(original_filename);
    let token = format!("{}-{}", entropy.now_millis(), entropy.random_suffix());
    let file_part = format!("{}-{}", token, name);

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        StorageKey(file_part)
    } else {
        StorageKey(format!("{}/{}", prefix, file_part))
    }
}

/// 校验客户端传入的键（删除接口使用）
pub fn validate_key(key: &str) -> AppResult<StorageKey> {
    if key.is_empty() {
        return Err(AppError::bad_request("key is required"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(AppError::bad_request(format!(
            "key must be at most {} characters",
            MAX_KEY_LEN
        )));
    }

    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(AppError::bad_request(
                "key must be a relative path without empty, '.' or '..' segments",
            ));
        }
        if !segment.chars().all(is_key_char) {
            return Err(AppError::bad_request(
                "key contains characters outside [A-Za-z0-9._-/]",
            ));
        }
    }

    Ok(StorageKey(key.to_string()))
}
