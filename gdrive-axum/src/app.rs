use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::{any, get};
use axum::Router;
use gdrive_blob::{MultipartBackend, UploadConfig, UploadCoordinator};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::{channels, routes, ChannelHub};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<UploadCoordinator>,
    pub hub: Arc<ChannelHub>,
}

/// Upload server: the router plus the state behind it
#[derive(Clone)]
pub struct GdriveApp {
    pub state: AppState,
    pub router: Router<()>,
}

impl GdriveApp {
    /// Wire a backend to a fresh channel hub
    pub fn new(backend: Arc<dyn MultipartBackend>, config: UploadConfig) -> Self {
        let hub = Arc::new(ChannelHub::new());
        let coordinator = UploadCoordinator::new(backend, hub.clone(), config);
        Self::from_parts(coordinator, hub)
    }

    pub fn from_parts(coordinator: UploadCoordinator, hub: Arc<ChannelHub>) -> Self {
        let state = AppState {
            coordinator: Arc::new(coordinator),
            hub,
        };
        Self {
            router: router(state.clone()),
            state,
        }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        self.listen_with_shutdown(addr, std::future::pending()).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests
    pub async fn listen_with_shutdown<A, F>(self, addr: A, signal: F) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;
        Ok(())
    }
}

/// Router with upload, listing and event routes
///
/// CORS headers are stamped on every response; `OPTIONS` itself is answered by
/// the root dispatcher.
pub fn router(state: AppState) -> Router<()> {
    Router::new()
        .route("/", any(routes::dispatch))
        .route("/events", get(channels::subscribe))
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("OPTIONS, POST, GET"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("*"),
                )),
        )
        .with_state(state)
}
