#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use gdrive_blob::{
    ByteStream, CompletedPart, MemoryBackend, MultipartBackend, ObjectSummary, ObjectTarget,
    ProgressEvent, ProgressSink, SessionId, UploadError, UploadResult,
};

/// Backend call as seen by the test double
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initiate,
    UploadPart { part_number: u32, body: Bytes },
    Complete { parts: Vec<u32> },
    Abort,
}

/// Memory backend that records calls and fails on demand
#[derive(Default)]
pub struct ScriptedBackend {
    inner: MemoryBackend,
    calls: Mutex<Vec<Call>>,
    fail_part: Option<u32>,
    fail_complete: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_part(part_number: u32) -> Self {
        Self {
            fail_part: Some(part_number),
            ..Self::default()
        }
    }

    pub fn failing_complete() -> Self {
        Self {
            fail_complete: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn uploaded_parts(&self) -> Vec<(u32, Bytes)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UploadPart { part_number, body } => Some((part_number, body)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }
}

#[async_trait]
impl MultipartBackend for ScriptedBackend {
    async fn initiate(&self, target: &ObjectTarget) -> UploadResult<SessionId> {
        self.calls.lock().push(Call::Initiate);
        self.inner.initiate(target).await
    }

    async fn upload_part(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        part_number: u32,
        body: Bytes,
    ) -> UploadResult<String> {
        if self.fail_part == Some(part_number) {
            return Err(UploadError::backend_msg("connection reset by peer"));
        }
        self.calls.lock().push(Call::UploadPart {
            part_number,
            body: body.clone(),
        });
        self.inner.upload_part(session, target, part_number, body).await
    }

    async fn complete(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        parts: &[CompletedPart],
    ) -> UploadResult<Option<String>> {
        self.calls.lock().push(Call::Complete {
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.fail_complete {
            return Err(UploadError::backend_msg("service unavailable"));
        }
        self.inner.complete(session, target, parts).await
    }

    async fn abort(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<()> {
        self.calls.lock().push(Call::Abort);
        self.inner.abort(session, target).await
    }

    async fn list(&self, bucket: &str) -> UploadResult<Vec<ObjectSummary>> {
        self.inner.list(bucket).await
    }
}

/// Progress sink that keeps every event with the (tokio) time it arrived
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Instant, ProgressEvent)>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn totals(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .map(|(_, e)| e.processed_already)
            .collect()
    }

    pub fn instants(&self) -> Vec<Instant> {
        self.events.lock().iter().map(|(at, _)| *at).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn publish(&self, event: ProgressEvent) -> UploadResult<()> {
        self.events.lock().push((Instant::now(), event));
        if self.fail {
            return Err(UploadError::backend_msg("client disconnected"));
        }
        Ok(())
    }
}

/// Stream yielding `chunks` in order
pub fn chunked(chunks: Vec<Bytes>) -> ByteStream {
    Box::pin(futures::stream::iter(
        chunks.into_iter().map(Ok::<_, std::io::Error>),
    ))
}

/// Stream of `total` bytes cut into `chunk` sized pieces, with a recognisable pattern
pub fn patterned(total: usize, chunk: usize) -> (Bytes, ByteStream) {
    let data: Bytes = (0..total).map(|i| (i % 251) as u8).collect::<Vec<_>>().into();
    let pieces = (0..total)
        .step_by(chunk)
        .map(|start| data.slice(start..(start + chunk).min(total)))
        .collect();
    (data, chunked(pieces))
}
