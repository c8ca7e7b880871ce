use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    ByteStream, ClientChannel, FileField, FileNameKeys, FileStatus, KeyStrategy,
    MultipartBackend, MultipartUploadSession, NotificationTransport, ObjectTarget, UploadConfig,
    UploadPipeline, UploadReceipt, UploadResult,
};

/// Yields the file fields of an incoming form, in order
#[async_trait]
pub trait FileFieldSource: Send {
    async fn next_file(&mut self) -> UploadResult<Option<FileField>>;
}

/// The upload that stopped a form batch
#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub file_name: String,
    pub message: String,
}

/// Outcome of every file accepted from one form
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub receipts: Vec<UploadReceipt>,
    pub failure: Option<FailedUpload>,
}

impl BatchSummary {
    pub fn total_bytes(&self) -> u64 {
        self.receipts.iter().map(|r| r.size_bytes).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Entry point for uploads: one fresh pipeline per accepted file
///
/// The backend and transport are shared; sessions, accumulators and throttles
/// are never shared between two uploads.
#[derive(Clone)]
pub struct UploadCoordinator {
    backend: Arc<dyn MultipartBackend>,
    transport: Arc<dyn NotificationTransport>,
    keys: Arc<dyn KeyStrategy>,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        backend: Arc<dyn MultipartBackend>,
        transport: Arc<dyn NotificationTransport>,
        config: UploadConfig,
    ) -> Self {
        let keys = Arc::new(FileNameKeys::new(config.key_prefix.clone()));
        Self {
            backend,
            transport,
            keys,
            config,
        }
    }

    /// Replace the default file-name key strategy
    pub fn with_key_strategy<K: KeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// Progress sink bound to `client_id`
    pub fn channel(&self, client_id: &str) -> ClientChannel {
        ClientChannel::new(self.transport.clone(), client_id)
    }

    /// Stream `stream` into a new object named after `file_name`
    pub async fn accept_upload(
        &self,
        stream: ByteStream,
        file_name: &str,
        client_id: &str,
    ) -> UploadResult<UploadReceipt> {
        self.accept_upload_with_cancel(stream, file_name, client_id, CancellationToken::new())
            .await
    }

    pub async fn accept_upload_with_cancel(
        &self,
        stream: ByteStream,
        file_name: &str,
        client_id: &str,
        cancel: CancellationToken,
    ) -> UploadResult<UploadReceipt> {
        let target = ObjectTarget::new(self.config.bucket.clone(), self.keys.object_key(file_name));
        let session =
            MultipartUploadSession::new(self.backend.clone(), target, self.config.part_threshold)
                .with_allow_empty(self.config.allow_empty);
        let pipeline = UploadPipeline::new(session, self.config.min_progress_interval)
            .abort_on_failure(self.config.abort_on_failure);

        let channel = self.channel(client_id);
        pipeline.run(stream, file_name, &channel, &cancel).await
    }

    /// Accept every file field of a form, one after another
    ///
    /// `on_all_files_handled` runs exactly once, after the last accepted upload
    /// finished. The first failure stops the batch and is returned.
    pub async fn accept_form<F>(
        &self,
        source: &mut dyn FileFieldSource,
        client_id: &str,
        on_all_files_handled: F,
    ) -> UploadResult<BatchSummary>
    where
        F: FnOnce(&BatchSummary) + Send,
    {
        let mut summary = BatchSummary::default();
        let mut outcome = Ok(());

        loop {
            let field = match source.next_file().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(err) => {
                    summary.failure = Some(FailedUpload {
                        file_name: String::new(),
                        message: err.to_string(),
                    });
                    outcome = Err(err);
                    break;
                }
            };

            info!(field = %field.field_name, file = %field.file_name, client = client_id, "file field received");

            match self
                .accept_upload(field.stream, &field.file_name, client_id)
                .await
            {
                Ok(receipt) => summary.receipts.push(receipt),
                Err(err) => {
                    warn!(file = %field.file_name, error = %err, "form upload stopped");
                    summary.failure = Some(FailedUpload {
                        file_name: field.file_name,
                        message: err.to_string(),
                    });
                    outcome = Err(err);
                    break;
                }
            }
        }

        on_all_files_handled(&summary);
        outcome.map(|_| summary)
    }

    /// Every stored object in the configured bucket
    pub async fn list_files(&self) -> UploadResult<Vec<FileStatus>> {
        let objects = self.backend.list(&self.config.bucket).await?;
        Ok(objects.into_iter().map(FileStatus::from_summary).collect())
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn MultipartBackend> {
        &self.backend
    }
}
