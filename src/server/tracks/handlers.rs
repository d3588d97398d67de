use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    CountResponse, ListTracksResponse, MessageResponse, TrackEntry, TrackResponse, UploadResponse,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::tracks::{StorageError, Track};
use crate::types::{TrackRecord, User};

const GPX_CONTENT_TYPE: &str = "application/gpx+xml";

struct Upload {
    file_name: String,
    data: Bytes,
}

fn storage_err(e: StorageError) -> ApiError {
    match e {
        StorageError::NotFound => ApiError::not_found("Track not found"),
        StorageError::Conflict(_) => ApiError::conflict("File with the same name already exists"),
        StorageError::InvalidName(reason) => {
            ApiError::bad_request(format!("Invalid file name: {reason}"))
        }
        StorageError::InvalidExtension => ApiError::bad_request("Only GPX files are allowed"),
        StorageError::InvalidNamespace | StorageError::Io(_) => {
            tracing::error!("Track storage error: {e}");
            ApiError::internal("Storage error")
        }
    }
}

fn multipart_err(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("File exceeds the maximum upload size")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Reads the single `file` field from an upload form. Other fields are ignored.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(ApiError::bad_request(
                "Only one file may be uploaded per request",
            ));
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no name"))?;
        let data = field.bytes().await.map_err(multipart_err)?;

        upload = Some(Upload { file_name, data });
    }

    upload.ok_or_else(|| ApiError::bad_request("No file was provided"))
}

fn parse_track(state: &AppState, data: &[u8]) -> Result<Vec<Track>, ApiError> {
    state.parser.parse(data).map_err(|e| {
        tracing::error!("Failed to parse track: {e}");
        ApiError::internal("Failed to parse track")
    })
}

/// Records the stable id of a freshly written track. On failure the file is
/// removed again, and so is the namespace if its owner no longer exists.
async fn record_upload(
    state: &AppState,
    user: &User,
    file_name: &str,
    size_bytes: usize,
) -> Result<TrackRecord, ApiError> {
    let err = match state
        .store
        .record_track(&user.namespace_id, file_name, size_bytes as i64)
    {
        Ok(record) => return Ok(record),
        Err(e) => e,
    };

    tracing::error!(user_id = %user.id, "Failed to record track: {err}");
    if let Err(e) = state.storage.delete(&user.namespace_id, file_name).await {
        tracing::warn!("Failed to roll back track file: {e}");
    }

    if matches!(state.store.get_user(&user.id), Ok(None)) {
        if let Err(e) = state.storage.remove_namespace(&user.namespace_id).await {
            tracing::warn!("Failed to remove orphaned namespace: {e}");
        }
    }

    Err(ApiError::internal("Failed to store track"))
}

/// POST /tracks - Upload a track file
pub async fn upload_track(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let user = &auth.user;
    let upload = read_upload(&mut multipart).await?;

    state
        .storage
        .create(&user.namespace_id, &upload.file_name, &upload.data)
        .await
        .map_err(storage_err)?;

    let record = record_upload(&state, user, &upload.file_name, upload.data.len()).await?;

    tracing::info!(user_id = %user.id, id = record.seq, "Stored track");

    Ok(Json(ApiResponse::success(UploadResponse {
        message: "File uploaded successfully".to_string(),
        id: record.seq,
        file_name: record.name,
    })))
}

/// GET /tracks - List track names in enumeration order
pub async fn list_tracks(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let names = state
        .storage
        .list(&auth.user.namespace_id)
        .await
        .map_err(storage_err)?;

    Ok(Json(ApiResponse::success(ListTracksResponse { names })))
}

/// GET /tracks/all - Every track in one enumeration, parsed. Entries that
/// cannot be read or parsed carry an error instead of failing the request.
pub async fn list_all_tracks(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let namespace_id = &auth.user.namespace_id;
    let names = state
        .storage
        .list(namespace_id)
        .await
        .map_err(storage_err)?;

    let mut entries = Vec::with_capacity(names.len());
    for file_name in names {
        let entry = match state.storage.read(namespace_id, &file_name).await {
            Ok(raw) => match state.parser.parse(&raw) {
                Ok(data) => TrackEntry::parsed(file_name, data),
                Err(e) => {
                    tracing::warn!(file_name = %file_name, "Failed to parse track: {e}");
                    TrackEntry::failed(file_name, "Failed to parse track")
                }
            },
            Err(StorageError::NotFound) => TrackEntry::failed(file_name, "Track not found"),
            Err(e) => {
                tracing::error!(file_name = %file_name, "Failed to read track: {e}");
                TrackEntry::failed(file_name, "Failed to read track")
            }
        };
        entries.push(entry);
    }

    Ok(Json(ApiResponse::success(entries)))
}

/// GET /tracks/count
pub async fn count_tracks(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .storage
        .count(&auth.user.namespace_id)
        .await
        .map_err(storage_err)?;

    Ok(Json(ApiResponse::success(CountResponse { count })))
}

/// GET /tracks/records - Stable ids of tracks uploaded through the API
pub async fn list_track_records(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .store
        .list_track_records(&auth.user.namespace_id)
        .api_err("Failed to list tracks")?;

    Ok(Json(ApiResponse::success(records)))
}

/// GET /tracks/{index} - Parsed track at a position in the current enumeration.
/// Positions shift when tracks are added or removed; prefer `/tracks/by-id/{id}`.
pub async fn get_track(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(track): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let index: i64 = track
        .parse()
        .map_err(|_| ApiError::bad_request("Track index must be an integer"))?;
    let index = usize::try_from(index).map_err(|_| ApiError::not_found("Track not found"))?;

    let (file_name, data) = state
        .storage
        .read_by_index(&auth.user.namespace_id, index)
        .await
        .map_err(storage_err)?;

    let data = parse_track(&state, &data)?;

    Ok(Json(ApiResponse::success(TrackResponse {
        id: None,
        file_name,
        data,
    })))
}

/// GET /tracks/by-id/{id} - Parsed track by stable id
pub async fn get_track_by_id(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let namespace_id = &auth.user.namespace_id;
    let seq: i64 = id
        .parse()
        .map_err(|_| ApiError::bad_request("Track id must be an integer"))?;

    let record = state
        .store
        .get_track_by_seq(namespace_id, seq)
        .api_err("Failed to look up track")?
        .or_not_found("Track not found")?;

    let data = state
        .storage
        .read(namespace_id, &record.name)
        .await
        .map_err(storage_err)?;

    let data = parse_track(&state, &data)?;

    Ok(Json(ApiResponse::success(TrackResponse {
        id: Some(record.seq),
        file_name: record.name,
        data,
    })))
}

/// GET /tracks/{name}/download - Raw file as an attachment
pub async fn download_track(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(track): Path<String>,
) -> Result<Response, ApiError> {
    let (reader, size) = state
        .storage
        .open(&auth.user.namespace_id, &track)
        .await
        .map_err(storage_err)?;

    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, GPX_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&track))
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .map_err(|e| {
            tracing::error!("Failed to build download response: {e}");
            ApiError::internal("Failed to download track")
        })
}

/// DELETE /tracks/{name}
pub async fn delete_track(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(track): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = &auth.user;

    state
        .storage
        .delete(&user.namespace_id, &track)
        .await
        .map_err(storage_err)?;

    if let Err(e) = state.store.delete_track_record(&user.namespace_id, &track) {
        tracing::warn!(user_id = %user.id, "Failed to delete track record: {e}");
    }

    tracing::info!(user_id = %user.id, "Deleted track");

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "File deleted successfully",
    ))))
}

fn content_disposition(file_name: &str) -> HeaderValue {
    let safe_filename: String = file_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect();
    let safe_filename = if safe_filename.trim_matches('.').is_empty() {
        "track.gpx".to_string()
    } else {
        safe_filename
    };

    HeaderValue::from_str(&format!("attachment; filename=\"{safe_filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"track.gpx\""))
}
