use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracks::Track;
use crate::types::User;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    /// Stable creation-order id of the stored track.
    pub id: i64,
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ListTracksResponse {
    pub names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub file_name: String,
    pub data: Vec<Track>,
}

/// One element of the bulk listing: parsed data or the reason it is missing.
#[derive(Debug, Serialize)]
pub struct TrackEntry {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Track>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackEntry {
    #[must_use]
    pub fn parsed(file_name: String, data: Vec<Track>) -> Self {
        Self {
            file_name,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(file_name: String, error: impl Into<String>) -> Self {
        Self {
            file_name,
            data: None,
            error: Some(error.into()),
        }
    }
}
