//! 访问URL签发
//!
//! GET链接按可见性生成公开地址或限时签名地址；DELETE链接始终是限时签名地址。
//! 每次调用都独立签发，同一个键可以同时存在多个有效链接。

use crate::{
    error::AppResult,
    keys::StorageKey,
    storage::{Storage, UrlSigner, Visibility},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

pub const MIN_DELETE_URL_TTL_SECS: u64 = 30;
pub const MAX_DELETE_URL_TTL_SECS: u64 = 3600;

/// 已签发的访问URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessUrl {
    Public {
        url: String,
    },
    Signed {
        url: String,
        expires_in: u64,
        expires_at: DateTime<Utc>,
    },
}

impl AccessUrl {
    pub fn url(&self) -> &str {
        match self {
            AccessUrl::Public { url } | AccessUrl::Signed { url, .. } => url,
        }
    }

    /// 有效期（秒），公开链接为 None
    pub fn expires_in(&self) -> Option<u64> {
        match self {
            AccessUrl::Public { .. } => None,
            AccessUrl::Signed { expires_in, .. } => Some(*expires_in),
        }
    }

    fn signed(url: String, ttl: Duration, issued_at: DateTime<Utc>) -> Self {
        AccessUrl::Signed {
            url,
            expires_in: ttl.as_secs(),
            expires_at: expiry(issued_at, ttl),
        }
    }
}

/// 计算过期时刻，超出可表示范围时取最大时间
fn expiry(issued_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delta| issued_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// 调用方指定的删除链接有效期会被限制在 [30, 3600] 秒内
pub fn clamp_delete_ttl(requested: Option<u64>, default_secs: u64) -> u64 {
    match requested {
        Some(secs) => secs.clamp(MIN_DELETE_URL_TTL_SECS, MAX_DELETE_URL_TTL_SECS),
        None => default_secs,
    }
}

/// URL签发器
#[derive(Debug, Clone)]
pub struct UrlIssuer {
    storage: Arc<dyn Storage>,
    signer: Arc<UrlSigner>,
    default_delete_ttl_secs: u64,
}

impl UrlIssuer {
    pub fn new(
        storage: Arc<dyn Storage>,
        signer: Arc<UrlSigner>,
        default_delete_ttl_secs: u64,
    ) -> Self {
        Self {
            storage,
            signer,
            default_delete_ttl_secs,
        }
    }

    /// 签发GET链接
    pub async fn issue_get_url(
        &self,
        key: &StorageKey,
        visibility: Visibility,
    ) -> AppResult<AccessUrl> {
        match visibility {
            Visibility::Public => Ok(AccessUrl::Public {
                url: self.storage.public_url(key),
            }),
            Visibility::Private => {
                let ttl = self.storage.get_url_ttl();
                let issued_at = Utc::now();
                let url = self.storage.presign_get(key, ttl).await?;
                Ok(AccessUrl::signed(url, ttl, issued_at))
            }
        }
    }

    /// 签发DELETE链接；后端不支持原生签名时由网关签名
    pub async fn issue_delete_url(
        &self,
        key: &StorageKey,
        ttl_secs: Option<u64>,
    ) -> AppResult<AccessUrl> {
        let ttl = Duration::from_secs(clamp_delete_ttl(ttl_secs, self.default_delete_ttl_secs));
        let issued_at = Utc::now();

        let url = match self.storage.presign_delete(key, ttl).await? {
            Some(url) => url,
            None => {
                self.signer.sign_delete(key, expiry(issued_at, ttl))?
            }
        };

        Ok(AccessUrl::signed(url, ttl, issued_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::validate_key;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn issuer(dir: &TempDir) -> (UrlIssuer, Arc<UrlSigner>) {
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(dir.path().to_path_buf(), "", "http://localhost:3000").unwrap(),
        );
        let signer = Arc::new(UrlSigner::new(b"secret", "http://localhost:3000"));
        (UrlIssuer::new(storage, signer.clone(), 600), signer)
    }

    #[test]
    fn test_clamp_delete_ttl() {
        assert_eq!(clamp_delete_ttl(None, 600), 600);
        assert_eq!(clamp_delete_ttl(Some(5), 600), 30);
        assert_eq!(clamp_delete_ttl(Some(120), 600), 120);
        assert_eq!(clamp_delete_ttl(Some(86_400), 600), 3600);
    }

    #[test]
    fn test_expiry_saturates_instead_of_overflowing() {
        let now = Utc::now();
        assert_eq!(
            expiry(now, Duration::from_secs(600)),
            now + chrono::Duration::seconds(600)
        );
        assert_eq!(
            expiry(now, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );

        let url = AccessUrl::signed("u".to_string(), Duration::from_secs(u64::MAX), now);
        assert_eq!(url.expires_in(), Some(u64::MAX));
    }

    #[tokio::test]
    async fn test_public_get_url_has_no_expiry() {
        let dir = TempDir::new().unwrap();
        let (issuer, _) = issuer(&dir);
        let key = validate_key("uploads/x.png").unwrap();

        let url = issuer.issue_get_url(&key, Visibility::Public).await.unwrap();
        assert_eq!(
            url,
            AccessUrl::Public {
                url: "http://localhost:3000/assets/uploads/uploads/x.png".to_string()
            }
        );
        assert_eq!(url.expires_in(), None);
    }

    #[tokio::test]
    async fn test_delete_url_falls_back_to_gateway_signature() {
        let dir = TempDir::new().unwrap();
        let (issuer, _) = issuer(&dir);
        let key = validate_key("uploads/x.png").unwrap();

        let url = issuer.issue_delete_url(&key, None).await.unwrap();
        assert_eq!(url.expires_in(), Some(600));
        assert!(
            url.url()
                .starts_with("http://localhost:3000/api/files/signed?key=uploads/x.png&expires=")
        );

        let clamped = issuer.issue_delete_url(&key, Some(1)).await.unwrap();
        assert_eq!(clamped.expires_in(), Some(30));
    }

    #[tokio::test]
    async fn test_second_delete_url_does_not_invalidate_first() {
        let dir = TempDir::new().unwrap();
        let (issuer, signer) = issuer(&dir);
        let key = validate_key("uploads/x.png").unwrap();

        let first = issuer.issue_delete_url(&key, Some(60)).await.unwrap();
        let second = issuer.issue_delete_url(&key, Some(3600)).await.unwrap();

        for url in [first, second] {
            let query = url.url().split_once('?').unwrap().1;
            let params: std::collections::HashMap<&str, &str> = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .collect();
            let expires: i64 = params["expires"].parse().unwrap();
            assert!(
                signer
                    .verify_delete(params["key"], expires, params["signature"], Utc::now())
                    .is_ok()
            );
        }
    }
}
