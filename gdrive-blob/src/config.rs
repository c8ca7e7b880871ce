use std::time::Duration;

use crate::{UploadError, UploadResult};

/// Default part threshold: 5 MiB, the smallest non-final part S3 accepts
pub const DEFAULT_PART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Default minimum spacing between two progress events for one upload
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Default destination bucket
pub const DEFAULT_BUCKET: &str = "gdrive-uploads";

/// Configuration for streaming uploads
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Bucket (or root namespace) uploads are written to
    pub bucket: String,

    /// Pending bytes are flushed as one part once this many have accumulated
    pub part_threshold: usize,

    /// Minimum time between two progress events of the same upload
    pub min_progress_interval: Duration,

    /// Optional prefix prepended to every object key
    pub key_prefix: Option<String>,

    /// Abort the remote multipart session when a pipeline fails terminally
    pub abort_on_failure: bool,

    /// Complete zero-byte uploads with an empty part list instead of rejecting them
    pub allow_empty: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            part_threshold: DEFAULT_PART_THRESHOLD,
            min_progress_interval: DEFAULT_PROGRESS_INTERVAL,
            key_prefix: None,
            abort_on_failure: true,
            allow_empty: false,
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket<S: Into<String>>(mut self, bucket: S) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set part threshold in bytes
    pub fn with_part_threshold(mut self, bytes: usize) -> Self {
        self.part_threshold = bytes;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.min_progress_interval = interval;
        self
    }

    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Leave failed sessions open on the backend
    pub fn keep_failed_sessions(mut self) -> Self {
        self.abort_on_failure = false;
        self
    }

    pub fn allow_empty_uploads(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Check the config before handing it to a coordinator
    pub fn validate(&self) -> UploadResult<()> {
        if self.part_threshold == 0 {
            return Err(UploadError::invalid("part threshold must be greater than zero"));
        }
        if self.bucket.trim().is_empty() {
            return Err(UploadError::invalid("bucket must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_storage_protocol() {
        let config = UploadConfig::default();
        assert_eq!(config.part_threshold, 5 * 1024 * 1024);
        assert_eq!(config.min_progress_interval, Duration::from_millis(200));
        assert!(config.abort_on_failure);
        assert!(!config.allow_empty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = UploadConfig::new().with_part_threshold(0);
        assert!(matches!(config.validate(), Err(UploadError::Invalid { .. })));
    }
}
