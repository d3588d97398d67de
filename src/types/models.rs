use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered identity. `namespace_id` keys the user's storage directory
/// and never changes after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub namespace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stable creation-order id for a stored track. Sequence numbers are
/// monotonic per namespace and are not reused after deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(skip)]
    pub namespace_id: String,
    #[serde(rename = "id")]
    pub seq: i64,
    pub name: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
