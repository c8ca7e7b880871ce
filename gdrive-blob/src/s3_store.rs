use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    CompletedPart, MultipartBackend, ObjectSummary, ObjectTarget, SessionId, UploadError,
    UploadResult,
};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: Option<String>,
    /// Custom endpoint (MinIO, RustFS, localstack...); path-style addressing is used when set
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Multipart backend on top of the AWS S3 API
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the standard AWS environment and profile chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    /// Build a client from explicit settings, falling back to the environment for anything unset
    pub async fn connect(settings: S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = settings.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let (Some(access_key), Some(secret)) =
            (settings.access_key_id.clone(), settings.secret_access_key.clone())
        {
            loader = loader.credentials_provider(Credentials::new(access_key, secret, None, None, "gdrive"));
        }
        if let Some(endpoint) = settings.endpoint_url.clone() {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(settings.endpoint_url.is_some())
                .build(),
        );
        Self::new(client)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> UploadError {
        UploadError::backend(err)
    }
}

#[async_trait]
impl MultipartBackend for S3Backend {
    async fn initiate(&self, target: &ObjectTarget) -> UploadResult<SessionId> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .send()
            .await
            .map_err(Self::map_aws_error)?;

        output
            .upload_id
            .map(SessionId::from_string)
            .ok_or_else(|| UploadError::backend_msg("S3 returned no upload id"))
    }

    async fn upload_part(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        part_number: u32,
        body: Bytes,
    ) -> UploadResult<String> {
        let part_number = aws_part_number(part_number)?;

        let output = self
            .client
            .upload_part()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(session.as_str())
            .part_number(part_number)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(Self::map_aws_error)?;

        output
            .e_tag
            .ok_or_else(|| UploadError::backend_msg(format!("S3 returned no ETag for part {}", part_number)))
    }

    async fn complete(
        &self,
        session: &SessionId,
        target: &ObjectTarget,
        parts: &[CompletedPart],
    ) -> UploadResult<Option<String>> {
        let completed = parts
            .iter()
            .map(|p| {
                Ok(AwsCompletedPart::builder()
                    .part_number(aws_part_number(p.part_number)?)
                    .e_tag(&p.etag)
                    .build())
            })
            .collect::<UploadResult<Vec<_>>>()?;

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(session.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(Self::map_aws_error)?;

        debug!(object = %target, location = ?output.location, "S3 multipart upload completed");
        Ok(output.e_tag)
    }

    async fn abort(&self, session: &SessionId, target: &ObjectTarget) -> UploadResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(session.as_str())
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    async fn list(&self, bucket: &str) -> UploadResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .fetch_owner(true)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(Self::map_aws_error)?;

            for object in output.contents.unwrap_or_default() {
                let Some(key) = object.key else { continue };
                objects.push(ObjectSummary {
                    key,
                    size_bytes: object.size.unwrap_or_default().max(0) as u64,
                    last_modified: object
                        .last_modified
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                    owner: object.owner.and_then(|o| o.display_name.or(o.id)),
                });
            }

            match output.next_continuation_token {
                Some(token) if output.is_truncated.unwrap_or(false) => continuation = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}

/// S3 part numbers are `i32` on the wire
fn aws_part_number(part_number: u32) -> UploadResult<i32> {
    i32::try_from(part_number)
        .map_err(|_| UploadError::invalid(format!("Part number {} out of range", part_number)))
}
