use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::BufReader;
use uuid::Uuid;

/// The only file extension accepted for uploads (compared case-insensitively).
pub const TRACK_EXTENSION: &str = "gpx";

const NAMESPACE_ID_LEN: usize = 32;
const MAX_NAME_LEN: usize = 255;
const STAGING_PREFIX: &str = ".upload-";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("track not found")]
    NotFound,
    #[error("a track named '{0}' already exists")]
    Conflict(String),
    #[error("invalid track name: {0}")]
    InvalidName(&'static str),
    #[error("only .gpx files are allowed")]
    InvalidExtension,
    #[error("invalid namespace id")]
    InvalidNamespace,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Removes the staging file when dropped, including when an upload future is
/// cancelled mid-write.
struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove staging file: {e}");
            }
        }
    }
}

/// Writes `data` to a fresh staging file and links it onto `final_path`.
/// Fails with `AlreadyExists` if the final name is taken.
fn stage_and_link(staging_path: PathBuf, final_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let staging = StagingFile::new(staging_path);

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging.path())?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    std::fs::hard_link(staging.path(), final_path)
}

/// Filesystem-backed track storage with one directory per namespace.
///
/// Namespace directories are created lazily on the first upload. Names are
/// compared exactly (case-sensitive) and writes never replace an existing
/// file: collision detection is the exclusive link of a fully written staging
/// file onto the final name, so concurrent uploads of the same name resolve
/// to one success and `Conflict` for the rest.
pub struct TrackStorage {
    base_path: PathBuf,
}

impl TrackStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("tracks"),
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn namespace_path(&self, namespace_id: &str) -> Result<PathBuf, StorageError> {
        validate_namespace_id(namespace_id)?;
        Ok(self.base_path.join(namespace_id))
    }

    fn track_path(&self, namespace_id: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.namespace_path(namespace_id)?.join(name))
    }

    /// Stores a new track. Returns `Conflict` if the name is already taken.
    pub async fn create(
        &self,
        namespace_id: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        validate_name(name)?;
        if !has_track_extension(name) {
            return Err(StorageError::InvalidExtension);
        }

        let dir = self.namespace_path(namespace_id)?;
        fs::create_dir_all(&dir).await?;

        let final_path = dir.join(name);
        let staging_path = dir.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        let data = data.to_vec();

        // Blocking tasks run to completion, so a dropped request cannot
        // interrupt staging before the guard cleans up.
        let linked =
            tokio::task::spawn_blocking(move || stage_and_link(staging_path, &final_path, &data))
                .await
                .map_err(|e| std::io::Error::other(format!("spawn_blocking failed: {e}")))?;

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::Conflict(name.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Lists track names in the namespace, sorted bytewise so positions are
    /// reproducible between calls when the directory has not changed.
    /// A namespace that was never written to is empty.
    pub async fn list(&self, namespace_id: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.namespace_path(namespace_id)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    pub async fn count(&self, namespace_id: &str) -> Result<usize, StorageError> {
        Ok(self.list(namespace_id).await?.len())
    }

    /// Reads the track at `index` in a single snapshot of [`Self::list`].
    pub async fn read_by_index(
        &self,
        namespace_id: &str,
        index: usize,
    ) -> Result<(String, Vec<u8>), StorageError> {
        let names = self.list(namespace_id).await?;
        let name = names.into_iter().nth(index).ok_or(StorageError::NotFound)?;
        let data = self.read(namespace_id, &name).await?;
        Ok((name, data))
    }

    pub async fn read(&self, namespace_id: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.track_path(namespace_id, name)?;
        fs::read(&path).await.map_err(StorageError::from_io)
    }

    /// Opens a track for streaming. Returns the reader and the file size.
    pub async fn open(
        &self,
        namespace_id: &str,
        name: &str,
    ) -> Result<(BufReader<File>, u64), StorageError> {
        let path = self.track_path(namespace_id, name)?;
        let file = File::open(&path).await.map_err(StorageError::from_io)?;

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }

        Ok((BufReader::new(file), metadata.len()))
    }

    pub async fn delete(&self, namespace_id: &str, name: &str) -> Result<(), StorageError> {
        let path = self.track_path(namespace_id, name)?;
        fs::remove_file(&path).await.map_err(StorageError::from_io)
    }

    /// Removes a namespace directory and everything in it.
    /// Returns false if the namespace was never created.
    pub async fn remove_namespace(&self, namespace_id: &str) -> Result<bool, StorageError> {
        let dir = self.namespace_path(namespace_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[must_use]
pub fn has_track_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TRACK_EXTENSION))
}

fn validate_namespace_id(namespace_id: &str) -> Result<(), StorageError> {
    if namespace_id.len() != NAMESPACE_ID_LEN
        || !namespace_id
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(StorageError::InvalidNamespace);
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidName("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StorageError::InvalidName(
            "name cannot exceed 255 bytes",
        ));
    }
    if name.starts_with('.') {
        return Err(StorageError::InvalidName("name cannot start with a period"));
    }

    const INVALID_CHARS: &[char] = &['/', '\\', '\0', '\n', '\r'];
    if name.chars().any(|c| INVALID_CHARS.contains(&c)) {
        return Err(StorageError::InvalidName(
            "name contains invalid characters",
        ));
    }

    Ok(())
}
