mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the identity and track-record database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    /// Fails with `AlreadyExists` on a duplicate email and
    /// `NamespaceCollision` on a duplicate namespace id.
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Track record operations
    /// Assigns the next sequence number in the namespace. Any stale record
    /// with the same name is replaced.
    fn record_track(&self, namespace_id: &str, name: &str, size_bytes: i64)
    -> Result<TrackRecord>;
    fn get_track_by_seq(&self, namespace_id: &str, seq: i64) -> Result<Option<TrackRecord>>;
    fn list_track_records(&self, namespace_id: &str) -> Result<Vec<TrackRecord>>;
    fn delete_track_record(&self, namespace_id: &str, name: &str) -> Result<bool>;
}
