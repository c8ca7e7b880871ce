use thiserror::Error;

/// Boxed source error carried by backend failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while streaming an upload to storage
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Storage backend unavailable: {source}")]
    BackendUnavailable {
        #[source]
        source: BoxError,
    },

    #[error("Upload of part {part_number} failed: {source}")]
    PartUploadFailed {
        part_number: u32,
        #[source]
        source: BoxError,
    },

    #[error("Failed to read upload stream: {source}")]
    StreamRead {
        #[source]
        source: std::io::Error,
    },

    #[error("Empty upload rejected for key {key}")]
    EmptyUploadRejected { key: String },

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Session is {found}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid request: {message}")]
    Invalid { message: String },
}

impl UploadError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::BackendUnavailable {
            source: Box::new(error),
        }
    }

    /// Create a backend error from a plain message
    pub fn backend_msg<S: Into<String>>(message: S) -> Self {
        let message: String = message.into();
        Self::BackendUnavailable {
            source: message.into(),
        }
    }

    /// Wrap a failure reported while uploading `part_number`
    pub fn part_failed(part_number: u32, cause: UploadError) -> Self {
        let source: BoxError = match cause {
            Self::BackendUnavailable { source } => source,
            other => Box::new(other),
        };
        Self::PartUploadFailed {
            part_number,
            source,
        }
    }

    /// Promote any error into `BackendUnavailable`, keeping existing ones as-is
    pub fn unavailable(cause: UploadError) -> Self {
        match cause {
            err @ Self::BackendUnavailable { .. } => err,
            other => Self::BackendUnavailable {
                source: Box::new(other),
            },
        }
    }

    pub fn stream_read(error: std::io::Error) -> Self {
        Self::StreamRead { source: error }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Part number of a failed part upload, if this is one
    pub fn failed_part(&self) -> Option<u32> {
        match self {
            Self::PartUploadFailed { part_number, .. } => Some(*part_number),
            _ => None,
        }
    }
}
