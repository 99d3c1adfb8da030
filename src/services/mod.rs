pub mod uploader;

pub use uploader::{UploadDescriptor, UploadService, UploadStage, UploadedFile};
