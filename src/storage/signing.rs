//! 网关签名URL（HMAC-SHA256）
//!
//! 签名内容为 `<action>\n<key>\n<expires>`，结果以十六进制放在 `signature` 查询参数中。
//! 持有URL即可执行对应操作，无需额外凭证。

use crate::{
    config::Config,
    error::{AppError, AppResult},
    keys::StorageKey,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// 网关签名删除接口路径
pub const SIGNED_DELETE_ROUTE: &str = "/api/files/signed";

const DELETE_ACTION: &str = "DELETE";

/// 签名URL生成与校验
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    public_base_url: String,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: &[u8], public_base_url: &str) -> Self {
        Self {
            secret: secret.to_vec(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 使用配置的密钥；未配置时随机生成，重启后之前签发的URL全部失效
    pub fn from_config(config: &Config) -> Self {
        match &config.storage.signing_secret {
            Some(secret) => Self::new(secret.as_bytes(), &config.public_base_url()),
            None => {
                tracing::warn!("未配置 URL_SIGNING_SECRET，使用随机密钥，重启后已签发的删除链接将失效");
                let mut secret = [0u8; 32];
                rand::rng().fill_bytes(&mut secret);
                Self::new(&secret, &config.public_base_url())
            }
        }
    }

    fn mac(&self, action: &str, key: &str, expires: i64) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::signing(format!("invalid signing key: {}", e)))?;
        mac.update(format!("{}\n{}\n{}", action, key, expires).as_bytes());
        Ok(mac)
    }

    /// 生成签名删除URL
    pub fn sign_delete(&self, key: &StorageKey, expires_at: DateTime<Utc>) -> AppResult<String> {
        let expires = expires_at.timestamp();
        let signature = hex::encode(
            self.mac(DELETE_ACTION, key.as_str(), expires)?
                .finalize()
                .into_bytes(),
        );

        Ok(format!(
            "{}{}?key={}&expires={}&signature={}",
            self.public_base_url, SIGNED_DELETE_ROUTE, key, expires, signature
        ))
    }

    /// 校验签名删除请求
    pub fn verify_delete(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if now.timestamp() > expires {
            return Err(AppError::forbidden("Signed URL has expired"));
        }

        let signature =
            hex::decode(signature).map_err(|_| AppError::forbidden("Invalid signature"))?;

        self.mac(DELETE_ACTION, key, expires)?
            .verify_slice(&signature)
            .map_err(|_| AppError::forbidden("Invalid signature"))
    }
}
