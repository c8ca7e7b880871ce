use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::{ensure_contiguous, multipart_etag, part_etag};
use crate::{
    CompletedPart, MultipartBackend, ObjectSummary, ObjectTarget, SessionId, UploadError,
    UploadResult,
};

/// Directory under each bucket where in-flight parts are staged
const STAGING_DIR: &str = ".uploads";
const KEY_FILE: &str = "key";
const FS_OWNER: &str = "public";

/// Local filesystem backend
///
/// Layout: `{root}/{bucket}/{key}` for finished objects and
/// `{root}/{bucket}/.uploads/{session}/part-{n}` for staged parts. Parts are
/// concatenated into the final file on `complete`.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> UploadResult<PathBuf> {
        Ok(self.root.join(relative_path(bucket)?))
    }

    fn object_path(&self, target: &ObjectTarget) -> UploadResult<PathBuf> {
        Ok(self.bucket_dir(&target.bucket)?.join(relative_path(&target.key)?))
    }

    fn staging_dir(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<PathBuf> {
        Ok(self
            .bucket_dir(&target.bucket)?
            .join(STAGING_DIR)
            .join(relative_path(session.as_str())?))
    }

    async fn open_staging(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<PathBuf> {
        let dir = self.staging_dir(session, target)?;
        let recorded = fs::read_to_string(dir.join(KEY_FILE))
            .await
            .map_err(|_| UploadError::backend_msg(format!("No such upload session: {}", session)))?;
        if recorded != target.key {
            return Err(UploadError::backend_msg(format!(
                "Upload session {} belongs to another key",
                session
            )));
        }
        Ok(dir)
    }
}

fn part_file(part_number: u32) -> String {
    format!("part-{:06}", part_number)
}

/// Reject keys that would escape the bucket directory
fn relative_path(key: &str) -> UploadResult<PathBuf> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(UploadError::invalid(format!("Unsafe object key: {}", key)));
    }
    Ok(path.to_path_buf())
}

#[async_trait]
impl MultipartBackend for FsBackend {
    async fn initiate(&self, target: &ObjectTarget) -> UploadResult<SessionId> {
        self.object_path(target)?;

        let session = SessionId::new();
        let dir = self.staging_dir(&session, target)?;
        fs::create_dir_all(&dir).await.map_err(UploadError::backend)?;
        fs::write(dir.join(KEY_FILE), target.key.as_bytes())
            .await
            .map_err(UploadError::backend)?;

        debug!(dir = %dir.display(), "staging directory created");
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
        let dir = self.open_staging(session, target).await?;

        let etag = part_etag(&body);
        fs::write(dir.join(part_file(part_number)), &body)
            .await
            .map_err(UploadError::backend)?;
        Ok(etag)
    }

    async fn complete(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        parts: &[CompletedPart],
    ) -> UploadResult<Option<String>> {
        ensure_contiguous(parts)?;
        let dir = self.open_staging(session, target).await?;
        let destination = self.object_path(target)?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(UploadError::backend)?;
        }

        let mut output = fs::File::create(&destination)
            .await
            .map_err(UploadError::backend)?;
        for part in parts {
            let mut input = fs::File::open(dir.join(part_file(part.part_number)))
                .await
                .map_err(|_| {
                    UploadError::invalid(format!("Part {} was never uploaded", part.part_number))
                })?;
            tokio::io::copy(&mut input, &mut output)
                .await
                .map_err(UploadError::backend)?;
        }
        output.flush().await.map_err(UploadError::backend)?;

        fs::remove_dir_all(&dir).await.map_err(UploadError::backend)?;
        Ok(Some(multipart_etag(parts)))
    }

    async fn abort(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<()> {
        let dir = self.open_staging(session, target).await?;
        fs::remove_dir_all(&dir).await.map_err(UploadError::backend)
    }

    async fn list(&self, bucket: &str) -> UploadResult<Vec<ObjectSummary>> {
        let bucket_dir = self.bucket_dir(bucket)?;
        if !fs::try_exists(&bucket_dir).await.map_err(UploadError::backend)? {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut pending = vec![bucket_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(UploadError::backend)?;
            while let Some(entry) = entries.next_entry().await.map_err(UploadError::backend)? {
                let path = entry.path();
                let metadata = entry.metadata().await.map_err(UploadError::backend)?;

                if metadata.is_dir() {
                    if dir != bucket_dir || entry.file_name() != STAGING_DIR {
                        pending.push(path);
                    }
                    continue;
                }

                let key = path
                    .strip_prefix(&bucket_dir)
                    .map_err(UploadError::backend)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let last_modified = metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .ok()
                    .map(DateTime::<Utc>::from);

                objects.push(ObjectSummary {
                    key,
                    size_bytes: metadata.len(),
                    last_modified,
                    owner: Some(FS_OWNER.to_string()),
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    async fn upload(backend: &FsBackend, target: &ObjectTarget, parts: &[&'static str]) -> Option<String> {
        let session = assert_ok!(backend.initiate(target).await);
        let mut completed = Vec::new();
        for (i, body) in parts.iter().enumerate() {
            let part_number = i as u32 + 1;
            let etag = assert_ok!(
                backend
                    .upload_part(&session, target, part_number, Bytes::from_static(body.as_bytes()))
                    .await
            );
            completed.push(CompletedPart { part_number, etag });
        }
        assert_ok!(backend.complete(&session, target, &completed).await)
    }

    #[tokio::test]
    async fn concatenates_parts_into_final_file() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        let target = ObjectTarget::new("files", "docs/report.txt");

        let etag = upload(&backend, &target, &["first ", "second"]).await;
        assert!(etag.unwrap().ends_with("-2"));

        let content = std::fs::read(dir.path().join("files/docs/report.txt")).unwrap();
        assert_eq!(content, b"first second");
        let staging = std::fs::read_dir(dir.path().join("files").join(STAGING_DIR)).unwrap();
        assert_eq!(staging.count(), 0);
    }

    #[tokio::test]
    async fn abort_removes_staged_parts() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        let target = ObjectTarget::new("files", "a.bin");

        let session = assert_ok!(backend.initiate(&target).await);
        assert_ok!(backend.upload_part(&session, &target, 1, Bytes::from_static(b"x")).await);
        assert_ok!(backend.abort(&session, &target).await);

        assert!(!dir.path().join("files/a.bin").exists());
        assert_err!(backend.upload_part(&session, &target, 2, Bytes::from_static(b"y")).await);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());

        for key in ["../outside", "/etc/passwd", "a/../../b", ""] {
            let err = assert_err!(backend.initiate(&ObjectTarget::new("files", key)).await);
            assert!(matches!(err, UploadError::Invalid { .. }), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn lists_finished_objects_only() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());

        upload(&backend, &ObjectTarget::new("files", "one.txt"), &["1234"]).await;
        upload(&backend, &ObjectTarget::new("files", "nested/two.txt"), &["12"]).await;
        let pending = ObjectTarget::new("files", "pending.txt");
        assert_ok!(backend.initiate(&pending).await);

        let listed = assert_ok!(backend.list("files").await);
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["nested/two.txt", "one.txt"]);
        assert_eq!(listed[1].size_bytes, 4);
        assert_eq!(listed[1].owner.as_deref(), Some("public"));
    }

    #[tokio::test]
    async fn missing_bucket_lists_empty() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        assert!(assert_ok!(backend.list("nothing").await).is_empty());
    }
}
