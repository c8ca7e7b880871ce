use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};

use crate::{CompletedPart, ObjectSummary, ObjectTarget, SessionId, UploadError, UploadResult};

/// Multipart object storage operations - implemented by every storage backend
///
/// Parts are addressed by 1-based contiguous numbers. `complete` must reject a
/// part list with gaps or out of order.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Open a multipart upload session for `target`
    async fn initiate(&self, target: &ObjectTarget) -> UploadResult<SessionId>;

    /// Upload one part, returning its integrity tag
    async fn upload_part(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        part_number: u32,
        body: Bytes,
    ) -> UploadResult<String>;

    /// Assemble the committed parts into the final object
    async fn complete(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        parts: &[CompletedPart],
    ) -> UploadResult<Option<String>>;

    /// Discard a session and every part uploaded under it
    async fn abort(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<()>;

    /// List stored objects in a bucket
    async fn list(&self, bucket: &str) -> UploadResult<Vec<ObjectSummary>>;
}

/// Strategy for turning an uploaded file name into an object key
pub trait KeyStrategy: Send + Sync {
    fn object_key(&self, file_name: &str) -> String;
}

/// Default key strategy: the file's base name, optionally under a prefix
#[derive(Debug, Clone, Default)]
pub struct FileNameKeys {
    prefix: Option<String>,
}

impl FileNameKeys {
    pub fn new(prefix: Option<String>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self { prefix }
    }
}

impl KeyStrategy for FileNameKeys {
    fn object_key(&self, file_name: &str) -> String {
        // Browsers may send full client paths; only the last segment is kept.
        let base = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        let base = match base {
            "" | "." | ".." => format!("upload-{}", uuid::Uuid::new_v4().simple()),
            name => name.to_string(),
        };

        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, base),
            None => base,
        }
    }
}

/// Check that `parts` is exactly 1..=n in order
pub(crate) fn ensure_contiguous(parts: &[CompletedPart]) -> UploadResult<()> {
    for (index, part) in parts.iter().enumerate() {
        let expected = index as u32 + 1;
        if part.part_number != expected {
            return Err(UploadError::invalid(format!(
                "Part list out of sequence: expected part {}, got {}",
                expected, part.part_number
            )));
        }
    }
    Ok(())
}

/// S3-style ETag of a single part: hex MD5 of its bytes
pub(crate) fn part_etag(body: &[u8]) -> String {
    hex::encode(Md5::digest(body))
}

/// S3-style ETag of an assembled object: MD5 over the part digests, suffixed with the part count
pub(crate) fn multipart_etag(parts: &[CompletedPart]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        match hex::decode(&part.etag) {
            Ok(raw) => hasher.update(&raw),
            Err(_) => hasher.update(part.etag.as_bytes()),
        }
    }
    format!("{}-{}", hex::encode(hasher.finalize()), parts.len())
}
