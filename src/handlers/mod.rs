pub mod files;
pub mod health;
pub mod uploads;

pub use files::{delete_file, delete_signed, issue_delete_url};
pub use health::{health_check, readiness};
pub use uploads::{upload_image, upload_images};

use crate::{
    config::Config,
    services::UploadService,
    storage::{Storage, UrlSigner},
};
use std::sync::Arc;

/// 应用状态，启动时构建一次，之后只读共享
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub uploads: Arc<UploadService>,
    pub signer: Arc<UrlSigner>,
}

impl AppState {
    pub fn new(config: Arc<Config>, storage: Arc<dyn Storage>, signer: Arc<UrlSigner>) -> Self {
        let uploads = Arc::new(UploadService::new(storage.clone(), signer.clone(), &config));
        Self {
            config,
            storage,
            uploads,
            signer,
        }
    }
}
