//! # Trackvault
//!
//! Per-user storage of GPX track logs behind signed bearer credentials,
//! usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! trackvault = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use chrono::Duration;
//! use trackvault::auth::CredentialSigner;
//! use trackvault::server::{AppState, create_router};
//! use trackvault::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/trackvault.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let signer = CredentialSigner::new(b"a secret of at least 32 bytes....", Duration::days(7));
//! let state = Arc::new(AppState::new(Arc::new(store), &PathBuf::from("./data"), signer));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `trackvault` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod tracks;
pub mod types;
