//! HTTP API handlers, one module per resource.

pub mod auth;
pub mod files;
pub mod health;
pub mod limits;
pub mod metrics;
pub mod p2p;
pub mod shares;
pub mod uploads;
