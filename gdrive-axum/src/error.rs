use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gdrive_blob::UploadError;
use serde_json::json;

/// Feathers-ish error classes returned by the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,    // 400
    Unprocessable, // 422
    GeneralError,  // 500
    BadGateway,    // 502
    Unavailable,   // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
            ErrorKind::BadGateway => 502,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::BadGateway => "bad-gateway",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "name": self.kind.name(),
            "message": self.message,
            "code": self.kind.status_code(),
            "className": self.kind.class_name(),
        })
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        let kind = match &err {
            UploadError::Invalid { .. } | UploadError::StreamRead { .. } => ErrorKind::BadRequest,
            UploadError::EmptyUploadRejected { .. } => ErrorKind::Unprocessable,
            UploadError::PartUploadFailed { .. } | UploadError::BackendUnavailable { .. } => {
                ErrorKind::BadGateway
            }
            UploadError::Cancelled => ErrorKind::Unavailable,
            UploadError::InvalidState { .. } => ErrorKind::GeneralError,
        };
        Self::new(kind, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_map_to_statuses() {
        let cases = [
            (UploadError::invalid("bad"), 400),
            (
                UploadError::stream_read(std::io::Error::new(std::io::ErrorKind::Other, "eof")),
                400,
            ),
            (UploadError::EmptyUploadRejected { key: "a".into() }, 422),
            (UploadError::part_failed(2, UploadError::backend_msg("reset")), 502),
            (UploadError::backend_msg("down"), 502),
            (UploadError::Cancelled, 503),
            (
                UploadError::InvalidState {
                    expected: "active",
                    found: "completed",
                },
                500,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).kind.status_code(), status);
        }
    }

    #[test]
    fn body_uses_feathers_fields() {
        let body = ApiError::from(UploadError::part_failed(3, UploadError::backend_msg("reset"))).to_json();
        assert_eq!(body["name"], "BadGateway");
        assert_eq!(body["code"], 502);
        assert_eq!(body["className"], "bad-gateway");
        assert!(body["message"].as_str().unwrap().contains("part 3"));
    }
}
