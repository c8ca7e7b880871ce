//! gdrive-axum: HTTP front for gdrive uploads.
//!
//! Routes:
//!
//! - `GET /` lists stored files
//! - `POST /?clientId=...` streams every file of a `multipart/form-data` body to storage
//! - `OPTIONS /` answers 204, any other method gets a plain greeting
//! - `GET /events?clientId=...` delivers upload progress as Server-Sent Events

pub mod app;
pub mod channels;
mod error;
pub mod routes;
pub mod upload;

pub use app::{router, AppState, GdriveApp};
pub use channels::{ChannelHub, ChannelMessage};
pub use error::{ApiError, ErrorKind};
pub use routes::RouteOp;
pub use upload::{MultipartFields, UPLOAD_SUCCESS};

pub use axum;
