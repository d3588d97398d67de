use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use super::tracks::tracks_router;
use super::users::users_router;
use crate::auth::{CredentialSigner, PasswordHasher};
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::store::Store;
use crate::tracks::{GpxParser, TrackParser, TrackStorage};

/// Server context built once at startup and shared by every handler.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub storage: TrackStorage,
    pub parser: Arc<dyn TrackParser>,
    pub credentials: CredentialSigner,
    pub passwords: PasswordHasher,
    /// Upper bound on a single upload request body.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, data_dir: &Path, credentials: CredentialSigner) -> Self {
        Self {
            store,
            storage: TrackStorage::new(data_dir),
            parser: Arc::new(GpxParser),
            credentials,
            passwords: PasswordHasher::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/users", users_router())
        .nest("/api/v1", tracks_router(state.max_upload_bytes))
        .layer(middleware::from_fn(log_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
