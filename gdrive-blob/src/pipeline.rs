use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    ByteStream, MultipartUploadSession, ProgressEvent, ProgressThrottle, SessionState,
    UploadError, UploadReceipt, UploadResult,
};

/// Receiver of progress events for one upload
///
/// Publishing is fire-and-forget from the pipeline's point of view: an error
/// returned here is logged and the upload carries on.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, event: ProgressEvent) -> UploadResult<()>;
}

/// Streams one file into a multipart session while reporting progress
///
/// Chunks are pulled one at a time; the next chunk is not requested until the
/// previous one has been absorbed and, if it completed a part, uploaded.
pub struct UploadPipeline {
    session: MultipartUploadSession,
    throttle: ProgressThrottle,
    abort_on_failure: bool,
}

impl UploadPipeline {
    pub fn new(session: MultipartUploadSession, min_progress_interval: Duration) -> Self {
        Self {
            session,
            throttle: ProgressThrottle::new(min_progress_interval),
            abort_on_failure: true,
        }
    }

    /// Whether to abort the backend session when `run` fails
    pub fn abort_on_failure(mut self, enabled: bool) -> Self {
        self.abort_on_failure = enabled;
        self
    }

    /// Consume `stream` to the end and complete the upload
    ///
    /// Cancelling `cancel` stops chunk consumption and returns
    /// [`UploadError::Cancelled`] with the backend session left open.
    pub async fn run(
        mut self,
        mut stream: ByteStream,
        file_name: &str,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadReceipt> {
        info!(file = file_name, object = %self.session.target(), "upload started");

        match self.drive(&mut stream, file_name, sink, cancel).await {
            Ok(etag) => {
                let receipt = self.session.receipt(file_name, etag)?;
                info!(
                    file = file_name,
                    key = %receipt.key,
                    bytes = receipt.size_bytes,
                    parts = receipt.parts,
                    "upload finished"
                );
                Ok(receipt)
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &mut self,
        stream: &mut ByteStream,
        file_name: &str,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> UploadResult<Option<String>> {
        if self.session.state() == SessionState::Uninitiated {
            self.session.initiate().await?;
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                next = stream.next() => next,
            };

            let chunk = match next {
                Some(chunk) => chunk.map_err(UploadError::stream_read)?,
                None => break,
            };
            if chunk.is_empty() {
                continue;
            }

            self.session.submit(&chunk).await?;

            if let Some(total) = self.throttle.observe(chunk.len(), Instant::now()) {
                debug!(file = file_name, processed = total, "progress");
                if let Err(err) = sink.publish(ProgressEvent::new(total, file_name)).await {
                    warn!(file = file_name, error = %err, "failed to publish upload progress");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        self.session.finish().await
    }

    async fn fail(&mut self, err: &UploadError) {
        if matches!(err, UploadError::Cancelled) {
            info!(object = %self.session.target(), "upload cancelled, session left open");
            return;
        }

        warn!(object = %self.session.target(), error = %err, "upload failed");

        if !self.abort_on_failure || self.session.state() != SessionState::Active {
            return;
        }
        if let Err(abort_err) = self.session.abort().await {
            warn!(object = %self.session.target(), error = %abort_err, "failed to abort multipart session");
        }
    }

    pub fn session(&self) -> &MultipartUploadSession {
        &self.session
    }

    pub fn throttle(&self) -> &ProgressThrottle {
        &self.throttle
    }
}
