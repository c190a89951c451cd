//! Database repositories (PostgreSQL).
//!
//! This module contains traits and implementations for database access.
//! Each repository is abstracted behind a trait to enable mocking in tests.
//!
//! ## Repositories
//!
//! - **users** - principals upserted from the identity provider
//! - **shares** - share metadata and the share state machine
//! - **downloads** - append-only download events
//!
//! ## Usage in Handlers
//!
//! Repositories are accessed via `state.repos`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let share = state.repos.shares.find_by_id(&share_id).await?;
//!     let usage = state.repos.shares.usage_by_owner(user.id).await?;
//! }
//! ```

mod downloads;
mod shares;
mod users;

pub use downloads::{DownloadRepo, PgDownloadRepo};
pub use shares::{NewShare, OwnerUsage, PgShareRepo, RevokeOutcome, ShareRepo};
pub use users::{PgUserRepo, UserRepo};

#[cfg(test)]
pub use downloads::MockDownloadRepo;
#[cfg(test)]
pub use shares::MockShareRepo;
#[cfg(test)]
pub use users::MockUserRepo;

use std::sync::Arc;

/// Collection of all database repositories.
#[derive(Clone)]
pub struct Repos {
    pub users: Arc<dyn UserRepo>,
    pub shares: Arc<dyn ShareRepo>,
    pub downloads: Arc<dyn DownloadRepo>,
}
