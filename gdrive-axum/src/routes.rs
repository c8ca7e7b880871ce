use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::{upload, ApiError, AppState};

/// Plain-text body for methods without a handler
pub const DEFAULT_BODY: &str = "hello world";

/// Operations served on the root path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOp {
    Get,
    Post,
    Options,
    Default,
}

impl RouteOp {
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::GET => RouteOp::Get,
            Method::POST => RouteOp::Post,
            Method::OPTIONS => RouteOp::Options,
            _ => RouteOp::Default,
        }
    }
}

/// Root handler: picks the operation from the request method
pub async fn dispatch(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Result<Response, ApiError> {
    match RouteOp::from_method(request.method()) {
        RouteOp::Get => list(state).await,
        RouteOp::Post => upload::handle_upload(state, query, request).await,
        RouteOp::Options => Ok(StatusCode::NO_CONTENT.into_response()),
        RouteOp::Default => Ok(DEFAULT_BODY.into_response()),
    }
}

async fn list(state: AppState) -> Result<Response, ApiError> {
    let files = state.coordinator.list_files().await?;
    Ok(Json(files).into_response())
}
