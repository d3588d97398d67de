mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;

use crate::server::AppState;

pub fn tracks_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/tracks",
            get(handlers::list_tracks).post(handlers::upload_track),
        )
        .route("/tracks/all", get(handlers::list_all_tracks))
        .route("/tracks/count", get(handlers::count_tracks))
        .route("/tracks/records", get(handlers::list_track_records))
        .route("/tracks/by-id/{id}", get(handlers::get_track_by_id))
        .route(
            "/tracks/{track}",
            get(handlers::get_track).delete(handlers::delete_track),
        )
        .route("/tracks/{track}/download", get(handlers::download_track))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
