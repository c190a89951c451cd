use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::{
    config::Config, metrics::Metrics, repos::Repos, services::ObjectStore, signaling::Hub,
    stores::Stores,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Raw handles kept for health probes; everything else goes through
    /// the repos/stores abstractions.
    pub database: Pool<Postgres>,
    pub redis: redis::Client,
    pub repos: Repos,
    pub stores: Stores,
    pub storage: Arc<dyn ObjectStore>,
    pub hub: Arc<Hub>,
    pub metrics: Arc<Metrics>,
}
