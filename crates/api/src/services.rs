//! External service abstractions.
//!
//! This module contains traits and implementations for external services
//! that the API depends on, plus the small pure helpers that belong with
//! them (storage-key derivation, password hashing).
//!
//! ## Services
//!
//! - **storage** - presigned-URL gateway over an S3-compatible store
//! - **password** - argon2id hashing for password-gated shares
//!
//! ## Usage in Handlers
//!
//! The object store is accessed via `AppState`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let url = state.storage.presign_get(&key, &name, ttl).await?;
//!     let present = state.storage.head(&key).await?.is_some();
//! }
//! ```

pub mod password;
mod storage;

pub use storage::{ObjectMeta, ObjectStore, S3ObjectStore, new_share_id, sanitize_filename,
    storage_key};

#[cfg(test)]
pub use storage::MockObjectStore;
