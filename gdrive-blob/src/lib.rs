//! # gdrive-blob: streaming multipart uploads
//!
//! `gdrive-blob` takes a file arriving as a stream of arbitrarily sized chunks
//! and writes it to object storage with the multipart protocol, without ever
//! holding more than one part in memory. While bytes flow, throttled progress
//! events are pushed to the uploading client on a side channel.
//!
//! ## Key Features
//!
//! - **Bounded memory**: chunks are re-cut into parts of a configurable size (5 MiB by default)
//! - **Back-pressure**: the next chunk is only pulled once the current part is stored
//! - **Throttled progress**: at most one event per interval, never ahead of the stored bytes
//! - **Storage agnostic**: S3, local filesystem and in-memory backends behind one trait
//! - **No leaked sessions**: failed uploads abort their backend session
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gdrive_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! let coordinator = UploadCoordinator::new(
//!     backend.clone(),
//!     Arc::new(NoopTransport),
//!     UploadConfig::default().with_bucket("files"),
//! );
//!
//! let chunks: Vec<std::io::Result<bytes::Bytes>> = vec![Ok(bytes::Bytes::from_static(b"Hello, world!"))];
//! let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
//!
//! let receipt = coordinator.accept_upload(stream, "hello.txt", "client-1").await?;
//! assert_eq!(receipt.size_bytes, 13);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐
//! │   UploadCoordinator   │  ← one pipeline per accepted file
//! ├───────────────────────┤
//! │    UploadPipeline     │  ← pulls chunks, throttles progress
//! ├───────────────────────┤
//! │ MultipartUploadSession│  ← part numbering, session lifecycle
//! ├───────────────────────┤
//! │   MultipartBackend    │  ← S3 / filesystem / memory
//! └───────────────────────┘
//! ```

mod accumulator;
mod config;
mod coordinator;
mod error;
mod fs_store;
mod listing;
mod memory_store;
pub mod notify;
mod pipeline;
mod s3_store;
mod session;
pub mod store;
pub mod throttle;
mod types;

pub use accumulator::ChunkAccumulator;
pub use config::{UploadConfig, DEFAULT_BUCKET, DEFAULT_PART_THRESHOLD, DEFAULT_PROGRESS_INTERVAL};
pub use coordinator::{BatchSummary, FailedUpload, FileFieldSource, UploadCoordinator};
pub use error::{BoxError, UploadError, UploadResult};
pub use fs_store::FsBackend;
pub use listing::{pretty_size, FileStatus};
pub use memory_store::MemoryBackend;
pub use notify::{ClientChannel, NoopTransport, NotificationTransport, PROGRESS_EVENT};
pub use pipeline::{ProgressSink, UploadPipeline};
pub use s3_store::{S3Backend, S3Settings};
pub use session::{MultipartUploadSession, SessionState};
pub use store::{FileNameKeys, KeyStrategy, MultipartBackend};
pub use throttle::{should_emit, ProgressState, ProgressThrottle};
pub use types::{
    ByteStream, CompletedPart, FileField, ObjectSummary, ObjectTarget, ProgressEvent, SessionId,
    UploadReceipt,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ByteStream, MemoryBackend, MultipartBackend, NoopTransport, NotificationTransport,
        UploadConfig, UploadCoordinator, UploadError, UploadReceipt, UploadResult,
    };
}
