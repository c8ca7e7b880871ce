use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use gdrive_blob::{FileField, FileFieldSource, UploadError, UploadResult};
use multer::Multipart;
use serde_json::json;
use tracing::info;

use crate::{ApiError, AppState};

/// Body returned once every file of the form is stored
pub const UPLOAD_SUCCESS: &str = "Files uploaded with success!";

/// Query keys accepted for the progress channel id
const CLIENT_ID_KEYS: [&str; 2] = ["clientId", "socketId"];

/// File fields of a `multipart/form-data` body, parsed as they arrive
///
/// Non-file fields are skipped. Each yielded field streams straight from the
/// request body, so it must be consumed or dropped before asking for the next.
pub struct MultipartFields {
    multipart: Multipart<'static>,
}

impl MultipartFields {
    pub fn from_request(request: Request) -> Result<Self, ApiError> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("Missing content-type header"))?;
        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| ApiError::bad_request(format!("Expected multipart/form-data: {}", e)))?;

        let body = request.into_body().into_data_stream();
        Ok(Self {
            multipart: Multipart::new(body, boundary),
        })
    }
}

#[async_trait]
impl FileFieldSource for MultipartFields {
    async fn next_file(&mut self) -> UploadResult<Option<FileField>> {
        loop {
            let field = self
                .multipart
                .next_field()
                .await
                .map_err(|e| UploadError::invalid(format!("Malformed multipart body: {}", e)))?;

            let Some(field) = field else {
                return Ok(None);
            };
            let Some(file_name) = field.file_name().map(str::to_string) else {
                continue;
            };

            let field_name = field.name().unwrap_or_default().to_string();
            let stream = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

            return Ok(Some(FileField {
                field_name,
                file_name,
                stream: Box::pin(stream),
            }));
        }
    }
}

pub(crate) fn client_id(query: &HashMap<String, String>) -> Result<String, ApiError> {
    CLIENT_ID_KEYS
        .iter()
        .find_map(|key| query.get(*key).filter(|id| !id.is_empty()))
        .cloned()
        .ok_or_else(|| ApiError::bad_request("Missing clientId query parameter"))
}

/// `POST /?clientId=...`: stream every file field to storage
pub(crate) async fn handle_upload(
    state: AppState,
    query: HashMap<String, String>,
    request: Request,
) -> Result<Response, ApiError> {
    let client_id = client_id(&query)?;
    let mut fields = MultipartFields::from_request(request)?;

    state
        .coordinator
        .accept_form(&mut fields, &client_id, |summary| {
            info!(
                client = %client_id,
                files = summary.receipts.len(),
                bytes = summary.total_bytes(),
                failed = summary.failure.is_some(),
                "all files handled"
            );
        })
        .await?;

    Ok((StatusCode::OK, Json(json!({ "result": UPLOAD_SUCCESS }))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn client_id_accepts_both_names() {
        assert_eq!(client_id(&query(&[("clientId", "a")])).unwrap(), "a");
        assert_eq!(client_id(&query(&[("socketId", "b")])).unwrap(), "b");
    }

    #[test]
    fn empty_client_id_falls_back_to_socket_id() {
        let id = client_id(&query(&[("clientId", ""), ("socketId", "abc")])).unwrap();
        assert_eq!(id, "abc");
    }

    #[test]
    fn missing_client_id_is_bad_request() {
        let err = client_id(&query(&[("other", "x")])).unwrap_err();
        assert_eq!(err.kind.status_code(), 400);
        assert!(client_id(&query(&[("clientId", "")])).is_err());
    }
}
