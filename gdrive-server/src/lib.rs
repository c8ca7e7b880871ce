pub mod config;

use std::sync::Arc;

use gdrive_axum::GdriveApp;
use gdrive_blob::{FsBackend, MemoryBackend, MultipartBackend, S3Backend};
use tracing::info;

pub use config::{ConfigMap, ServerSettings, StorageKind};

/// Instantiate the configured storage backend
pub async fn backend(settings: &ServerSettings) -> Arc<dyn MultipartBackend> {
    match settings.storage.kind {
        StorageKind::S3 => {
            info!(bucket = %settings.upload.bucket, endpoint = ?settings.storage.s3.endpoint_url, "using S3 storage");
            Arc::new(S3Backend::connect(settings.storage.s3.clone()).await)
        }
        StorageKind::Fs => {
            info!(root = %settings.storage.root.display(), "using filesystem storage");
            Arc::new(FsBackend::new(settings.storage.root.clone()))
        }
        StorageKind::Memory => {
            info!("using in-memory storage, uploads are lost on exit");
            Arc::new(MemoryBackend::new())
        }
    }
}

pub async fn build(settings: &ServerSettings) -> GdriveApp {
    let backend = backend(settings).await;
    GdriveApp::new(backend, settings.upload.clone())
}
