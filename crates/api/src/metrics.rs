//! Process-wide counters exposed at `GET /metrics` in Prometheus text
//! format.

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub uploads_presigned: IntCounter,
    pub uploads_finalized: IntCounter,
    pub downloads_issued: IntCounter,
    pub shares_revoked: IntCounter,
    pub shares_swept: IntCounter,
    pub sweep_failures: IntCounter,
    pub rate_limited: IntCounter,
    pub password_rejections: IntCounter,
    pub signal_peers: IntGauge,
    pub signal_relayed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let uploads_presigned = IntCounter::new(
            "filebeam_uploads_presigned_total",
            "Presigned upload URLs issued",
        )?;
        let uploads_finalized = IntCounter::new(
            "filebeam_uploads_finalized_total",
            "Uploads confirmed and made available",
        )?;
        let downloads_issued = IntCounter::new(
            "filebeam_downloads_issued_total",
            "Presigned download URLs issued",
        )?;
        let shares_revoked =
            IntCounter::new("filebeam_shares_revoked_total", "Shares revoked by owners")?;
        let shares_swept = IntCounter::new(
            "filebeam_shares_swept_total",
            "Shares transitioned to deleted by the sweeper",
        )?;
        let sweep_failures = IntCounter::new(
            "filebeam_sweep_failures_total",
            "Object deletions that failed and were left for retry",
        )?;
        let rate_limited = IntCounter::new(
            "filebeam_rate_limited_total",
            "Requests rejected by the admission controller",
        )?;
        let password_rejections = IntCounter::new(
            "filebeam_password_rejections_total",
            "Download attempts with a missing or wrong password",
        )?;
        let signal_peers = IntGauge::new(
            "filebeam_signal_peers",
            "Peer sessions currently joined to rooms",
        )?;
        let signal_relayed = IntCounter::new(
            "filebeam_signal_relayed_total",
            "Directed signaling frames relayed between peers",
        )?;

        registry.register(Box::new(uploads_presigned.clone()))?;
        registry.register(Box::new(uploads_finalized.clone()))?;
        registry.register(Box::new(downloads_issued.clone()))?;
        registry.register(Box::new(shares_revoked.clone()))?;
        registry.register(Box::new(shares_swept.clone()))?;
        registry.register(Box::new(sweep_failures.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(password_rejections.clone()))?;
        registry.register(Box::new(signal_peers.clone()))?;
        registry.register(Box::new(signal_relayed.clone()))?;

        Ok(Self {
            registry,
            uploads_presigned,
            uploads_finalized,
            downloads_issued,
            shares_revoked,
            shares_swept,
            sweep_failures,
            rate_limited,
            password_rejections,
            signal_peers,
            signal_relayed,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_contains_registered_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.downloads_issued.inc();
        metrics.downloads_issued.inc();

        let text = metrics.export().unwrap();
        assert!(text.contains("filebeam_downloads_issued_total 2"));
    }

    #[test]
    fn gauge_tracks_ups_and_downs() {
        let metrics = Metrics::new().unwrap();
        metrics.signal_peers.inc();
        metrics.signal_peers.inc();
        metrics.signal_peers.dec();

        assert_eq!(metrics.signal_peers.get(), 1);
    }
}
