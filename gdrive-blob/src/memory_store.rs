use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::store::{ensure_contiguous, multipart_etag, part_etag};
use crate::{
    CompletedPart, MultipartBackend, ObjectSummary, ObjectTarget, SessionId, UploadError,
    UploadResult,
};

/// Owner reported for objects held in memory
const MEMORY_OWNER: &str = "memory";

struct PendingUpload {
    target: ObjectTarget,
    parts: BTreeMap<u32, (String, Bytes)>,
}

struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    pending: HashMap<SessionId, PendingUpload>,
    objects: BTreeMap<(String, String), StoredObject>,
}

/// In-memory multipart backend for tests and local development
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of a completed object
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Number of sessions initiated but neither completed nor aborted
    pub fn open_sessions(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Part numbers uploaded so far under an open session
    pub fn pending_parts(&self, session: &SessionId) -> Vec<u32> {
        self.state
            .lock()
            .pending
            .get(session)
            .map(|p| p.parts.keys().copied().collect())
            .unwrap_or_default()
    }

    fn session_mismatch(session: &SessionId) -> UploadError {
        UploadError::backend_msg(format!("No such upload session: {}", session))
    }
}

#[async_trait]
impl MultipartBackend for MemoryBackend {
    async fn initiate(&self, target: &ObjectTarget) -> UploadResult<SessionId> {
        let session = SessionId::new();
        self.state.lock().pending.insert(
            session.clone(),
            PendingUpload {
                target: target.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(session)
    }

    async fn upload_part(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        part_number: u32,
        body: Bytes,
    ) -> UploadResult<String> {
        if part_number == 0 {
            return Err(UploadError::invalid("Part numbers start at 1"));
        }

        let mut state = self.state.lock();
        let pending = state
            .pending
            .get_mut(session)
            .filter(|p| &p.target == target)
            .ok_or_else(|| Self::session_mismatch(session))?;

        let etag = part_etag(&body);
        pending.parts.insert(part_number, (etag.clone(), body));
        Ok(etag)
    }

    async fn complete(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        parts: &[CompletedPart],
    ) -> UploadResult<Option<String>> {
        ensure_contiguous(parts)?;

        let mut state = self.state.lock();
        let pending = state
            .pending
            .get(session)
            .filter(|p| &p.target == target)
            .ok_or_else(|| Self::session_mismatch(session))?;

        let mut data = BytesMut::new();
        for part in parts {
            match pending.parts.get(&part.part_number) {
                Some((etag, body)) if *etag == part.etag => data.extend_from_slice(body),
                Some(_) => {
                    return Err(UploadError::invalid(format!(
                        "ETag mismatch for part {}",
                        part.part_number
                    )))
                }
                None => {
                    return Err(UploadError::invalid(format!(
                        "Part {} was never uploaded",
                        part.part_number
                    )))
                }
            }
        }

        let etag = multipart_etag(parts);
        state.pending.remove(session);
        state.objects.insert(
            (target.bucket.clone(), target.key.clone()),
            StoredObject {
                data: data.freeze(),
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(Some(etag))
    }

    async fn abort(&self, session: &SessionId, _target: &ObjectTarget) -> UploadResult<()> {
        self.state
            .lock()
            .pending
            .remove(session)
            .map(|_| ())
            .ok_or_else(|| Self::session_mismatch(session))
    }

    async fn list(&self, bucket: &str) -> UploadResult<Vec<ObjectSummary>> {
        let state = self.state.lock();
        Ok(state
            .objects
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, key), object)| ObjectSummary {
                key: key.clone(),
                size_bytes: object.data.len() as u64,
                last_modified: Some(object.last_modified),
                owner: Some(MEMORY_OWNER.to_string()),
            })
            .collect())
    }
}

impl MemoryBackend {
    /// ETag of a completed object
    pub fn object_etag(&self, bucket: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.etag.clone())
    }
}
