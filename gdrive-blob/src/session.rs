use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::{
    ChunkAccumulator, CompletedPart, MultipartBackend, ObjectTarget, SessionId, UploadError,
    UploadReceipt, UploadResult,
};

/// Lifecycle of a multipart upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitiated,
    Active,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitiated => "uninitiated",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one multipart upload against a backend
///
/// Bytes go through a [`ChunkAccumulator`]; every completed part is uploaded
/// before `submit` returns, strictly in part-number order. Failures leave the
/// session `Active` with `committed_parts` holding only the parts that made it.
/// The bytes of a failed part are kept and uploaded again, under the same part
/// number, by the next `submit` or `finish`.
pub struct MultipartUploadSession {
    backend: Arc<dyn MultipartBackend>,
    target: ObjectTarget,
    session_id: Option<SessionId>,
    state: SessionState,
    accumulator: ChunkAccumulator,
    /// Part whose upload failed, retried before anything else
    pending: Option<Bytes>,
    next_part_number: u32,
    committed: Vec<CompletedPart>,
    bytes_committed: u64,
    allow_empty: bool,
}

impl MultipartUploadSession {
    /// Create an uninitiated session
    pub fn new(backend: Arc<dyn MultipartBackend>, target: ObjectTarget, part_threshold: usize) -> Self {
        Self {
            backend,
            target,
            session_id: None,
            state: SessionState::Uninitiated,
            accumulator: ChunkAccumulator::new(part_threshold),
            pending: None,
            next_part_number: 1,
            committed: Vec::new(),
            bytes_committed: 0,
            allow_empty: false,
        }
    }

    /// Create a session and initiate it on the backend
    pub async fn open(
        backend: Arc<dyn MultipartBackend>,
        target: ObjectTarget,
        part_threshold: usize,
    ) -> UploadResult<Self> {
        let mut session = Self::new(backend, target, part_threshold);
        session.initiate().await?;
        Ok(session)
    }

    /// Complete zero-byte uploads with an empty part list
    pub fn with_allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// `Uninitiated -> Active`
    pub async fn initiate(&mut self) -> UploadResult<()> {
        self.expect_state(SessionState::Uninitiated)?;

        let session_id = self
            .backend
            .initiate(&self.target)
            .await
            .map_err(UploadError::unavailable)?;

        info!(object = %self.target, session = %session_id, "multipart session opened");
        self.session_id = Some(session_id);
        self.state = SessionState::Active;
        Ok(())
    }

    /// Feed bytes into the session, uploading any part that fills up
    ///
    /// If a previously failed part cannot be uploaded either, `chunk` is not
    /// absorbed and must be submitted again.
    pub async fn submit(&mut self, chunk: &[u8]) -> UploadResult<()> {
        self.expect_state(SessionState::Active)?;
        self.retry_pending().await?;

        if let Some(part) = self.accumulator.absorb(chunk) {
            self.upload_part(part).await?;
        }
        Ok(())
    }

    /// Flush the remainder and complete the upload: `Active -> Completed`
    ///
    /// A failing part upload or `complete` call leaves the session `Active`, so
    /// `finish` can be retried without losing bytes.
    pub async fn finish(&mut self) -> UploadResult<Option<String>> {
        self.expect_state(SessionState::Active)?;
        self.retry_pending().await?;

        if let Some(part) = self.accumulator.drain() {
            self.upload_part(part).await?;
        }

        if self.committed.is_empty() && !self.allow_empty {
            if let Err(err) = self.abort().await {
                warn!(object = %self.target, error = %err, "failed to abort empty multipart session");
            }
            return Err(UploadError::EmptyUploadRejected {
                key: self.target.key.clone(),
            });
        }

        let session_id = self.active_id()?;
        let etag = self
            .backend
            .complete(&session_id, &self.target, &self.committed)
            .await
            .map_err(UploadError::unavailable)?;

        info!(
            object = %self.target,
            session = %session_id,
            parts = self.committed.len(),
            bytes = self.bytes_committed,
            "multipart session completed"
        );
        self.state = SessionState::Completed;
        Ok(etag)
    }

    /// Discard the session on the backend: `Active -> Aborted`
    pub async fn abort(&mut self) -> UploadResult<()> {
        self.expect_state(SessionState::Active)?;

        let session_id = self.active_id()?;
        self.backend
            .abort(&session_id, &self.target)
            .await
            .map_err(UploadError::unavailable)?;

        info!(object = %self.target, session = %session_id, "multipart session aborted");
        self.state = SessionState::Aborted;
        Ok(())
    }

    async fn retry_pending(&mut self) -> UploadResult<()> {
        match self.pending.take() {
            Some(part) => self.upload_part(part).await,
            None => Ok(()),
        }
    }

    async fn upload_part(&mut self, body: Bytes) -> UploadResult<()> {
        let session_id = self.active_id()?;
        let part_number = self.next_part_number;
        let size = body.len() as u64;

        let etag = match self
            .backend
            .upload_part(&session_id, &self.target, part_number, body.clone())
            .await
        {
            Ok(etag) => etag,
            Err(err) => {
                self.pending = Some(body);
                return Err(UploadError::part_failed(part_number, err));
            }
        };

        debug!(session = %session_id, part_number, size, "part committed");
        self.committed.push(CompletedPart { part_number, etag });
        self.next_part_number += 1;
        self.bytes_committed += size;
        Ok(())
    }

    /// Receipt of a completed session
    pub fn receipt(&self, file_name: &str, etag: Option<String>) -> UploadResult<UploadReceipt> {
        self.expect_state(SessionState::Completed)?;

        Ok(UploadReceipt {
            key: self.target.key.clone(),
            session_id: self.active_id()?,
            file_name: file_name.to_string(),
            size_bytes: self.bytes_committed,
            parts: self.committed.len() as u32,
            etag,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    fn expect_state(&self, expected: SessionState) -> UploadResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(UploadError::InvalidState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            })
        }
    }

    fn active_id(&self) -> UploadResult<SessionId> {
        self.session_id.clone().ok_or(UploadError::InvalidState {
            expected: SessionState::Active.as_str(),
            found: self.state.as_str(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn target(&self) -> &ObjectTarget {
        &self.target
    }

    pub fn committed_parts(&self) -> &[CompletedPart] {
        &self.committed
    }

    pub fn next_part_number(&self) -> u32 {
        self.next_part_number
    }

    /// Bytes already accepted by the backend
    pub fn bytes_committed(&self) -> u64 {
        self.bytes_committed
    }

    /// Bytes not yet accepted by the backend, including a failed part
    pub fn buffered(&self) -> usize {
        self.accumulator.buffered() + self.pending.as_ref().map_or(0, Bytes::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBackend, ObjectSummary};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn target() -> ObjectTarget {
        ObjectTarget::new("bucket", "file.bin")
    }

    /// Memory backend whose `upload_part` fails once for one part number,
    /// and whose `abort` can be made to fail
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_part_once: Mutex<Option<u32>>,
        fail_abort: bool,
    }

    impl FlakyBackend {
        fn failing_part_once(part_number: u32) -> Self {
            Self {
                fail_part_once: Mutex::new(Some(part_number)),
                ..Self::default()
            }
        }

        fn failing_abort() -> Self {
            Self {
                fail_abort: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MultipartBackend for FlakyBackend {
        async fn initiate(&self, target: &ObjectTarget) -> UploadResult<SessionId> {
            self.inner.initiate(target).await
        }

        async fn upload_part(
            &self,
            session: &SessionId,
            target: &ObjectTarget,
            part_number: u32,
            body: Bytes,
        ) -> UploadResult<String> {
            let failing = {
                let mut fail = self.fail_part_once.lock();
                if *fail == Some(part_number) {
                    *fail = None;
                    true
                } else {
                    false
                }
            };
            if failing {
                return Err(UploadError::backend_msg("connection reset"));
            }
            self.inner.upload_part(session, target, part_number, body).await
        }

        async fn complete(
            &self,
            session: &SessionId,
            target: &ObjectTarget,
            parts: &[CompletedPart],
        ) -> UploadResult<Option<String>> {
            self.inner.complete(session, target, parts).await
        }

        async fn abort(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<()> {
            if self.fail_abort {
                return Err(UploadError::backend_msg("abort refused"));
            }
            self.inner.abort(session, target).await
        }

        async fn list(&self, bucket: &str) -> UploadResult<Vec<ObjectSummary>> {
            self.inner.list(bucket).await
        }
    }

    #[tokio::test]
    async fn uploads_parts_as_threshold_is_crossed() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = assert_ok!(MultipartUploadSession::open(backend.clone(), target(), 4).await);

        assert_ok!(session.submit(b"ab").await);
        assert!(session.committed_parts().is_empty());
        assert_ok!(session.submit(b"cdef").await);
        assert_eq!(session.committed_parts().len(), 1);
        assert_eq!(session.next_part_number(), 2);

        assert_ok!(session.submit(b"g").await);
        assert_ok!(session.finish().await);

        assert_eq!(session.state(), SessionState::Completed);
        let numbers: Vec<u32> = session.committed_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(session.bytes_committed(), 7);
        assert_eq!(backend.object("bucket", "file.bin").as_deref(), Some(&b"abcdefg"[..]));

        let receipt = assert_ok!(session.receipt("file.bin", None));
        assert_eq!(receipt.parts, 2);
        assert_eq!(receipt.size_bytes, 7);
        assert_eq!(Some(&receipt.session_id), session.session_id());
    }

    #[tokio::test]
    async fn submit_requires_active_session() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = MultipartUploadSession::new(backend, target(), 4);

        let err = assert_err!(session.submit(b"data").await);
        assert!(matches!(err, UploadError::InvalidState { expected: "active", found: "uninitiated" }));
    }

    #[tokio::test]
    async fn finish_twice_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = assert_ok!(MultipartUploadSession::open(backend, target(), 4).await);
        assert_ok!(session.submit(b"x").await);
        assert_ok!(session.finish().await);

        let err = assert_err!(session.finish().await);
        assert!(matches!(err, UploadError::InvalidState { found: "completed", .. }));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_and_aborted() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = assert_ok!(MultipartUploadSession::open(backend.clone(), target(), 4).await);

        let err = assert_err!(session.finish().await);
        assert!(matches!(err, UploadError::EmptyUploadRejected { .. }));
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(backend.open_sessions(), 0);
        assert!(backend.object("bucket", "file.bin").is_none());
    }

    #[tokio::test]
    async fn empty_upload_completes_when_allowed() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = assert_ok!(MultipartUploadSession::open(backend.clone(), target(), 4).await)
            .with_allow_empty(true);

        assert_ok!(session.finish().await);
        assert_eq!(session.state(), SessionState::Completed);
        assert!(session.committed_parts().is_empty());
        assert_eq!(backend.object("bucket", "file.bin").as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn abort_discards_pending_parts() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = assert_ok!(MultipartUploadSession::open(backend.clone(), target(), 2).await);
        assert_ok!(session.submit(b"abc").await);
        assert_eq!(backend.open_sessions(), 1);

        assert_ok!(session.abort().await);
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(backend.open_sessions(), 0);
        assert_err!(session.submit(b"more").await);
    }

    #[tokio::test]
    async fn failed_part_keeps_committed_prefix() {
        let backend = Arc::new(FlakyBackend::failing_part_once(2));
        let mut session = assert_ok!(MultipartUploadSession::open(backend, target(), 4).await);

        assert_ok!(session.submit(b"abcd").await);
        let err = assert_err!(session.submit(b"efgh").await);

        assert!(matches!(err, UploadError::PartUploadFailed { part_number: 2, .. }));
        assert_eq!(session.state(), SessionState::Active);
        let numbers: Vec<u32> = session.committed_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1]);
        assert_eq!(session.next_part_number(), 2);
        assert_eq!(session.bytes_committed(), 4);
        assert_eq!(session.buffered(), 4);
    }

    #[tokio::test]
    async fn finish_retry_reuploads_failed_final_part() {
        let backend = Arc::new(FlakyBackend::failing_part_once(2));
        let mut session = assert_ok!(MultipartUploadSession::open(backend.clone(), target(), 4).await);

        assert_ok!(session.submit(b"abcd").await);
        assert_ok!(session.submit(b"xy").await);
        let err = assert_err!(session.finish().await);
        assert!(matches!(err, UploadError::PartUploadFailed { part_number: 2, .. }));
        assert_eq!(session.buffered(), 2);

        assert_ok!(session.finish().await);
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.committed_parts().len(), 2);
        assert_eq!(backend.inner.object("bucket", "file.bin").as_deref(), Some(&b"abcdxy"[..]));
    }

    #[tokio::test]
    async fn submit_retries_failed_part_before_new_bytes() {
        let backend = Arc::new(FlakyBackend::failing_part_once(1));
        let mut session = assert_ok!(MultipartUploadSession::open(backend.clone(), target(), 4).await);

        assert_err!(session.submit(b"abcd").await);
        assert_ok!(session.submit(b"efgh").await);
        assert_ok!(session.finish().await);

        let numbers: Vec<u32> = session.committed_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(backend.inner.object("bucket", "file.bin").as_deref(), Some(&b"abcdefgh"[..]));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_even_if_abort_fails() {
        let backend = Arc::new(FlakyBackend::failing_abort());
        let mut session = assert_ok!(MultipartUploadSession::open(backend, target(), 4).await);

        let err = assert_err!(session.finish().await);
        assert!(matches!(err, UploadError::EmptyUploadRejected { .. }));
        assert_eq!(session.state(), SessionState::Active);
    }
}
