//! Object-storage gateway.
//!
//! The core never streams file bytes; it only mints presigned URLs against
//! an S3-compatible store and checks object existence. The narrow trait
//! keeps the store mockable and swappable (MinIO, R2, AWS).
//!
//! Storage keys are derived deterministically as
//! `{share_id}/{sanitized_filename}`; the key is the sole source of truth
//! for object identity and the original filename stays display-only.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use base64::prelude::*;

use crate::config::Config;

/// Metadata from a HEAD on a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size_bytes: i64,
}

/// Narrow capability the core needs from the object store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presign a PUT scoped to exactly this key, size, and content type.
    async fn presign_put(
        &self,
        key: &str,
        size_bytes: i64,
        mime_type: &str,
        ttl: Duration,
    ) -> Result<String>;

    /// Presign a GET with a download filename override.
    async fn presign_get(&self, key: &str, filename: &str, ttl: Duration) -> Result<String>;

    /// HEAD the object; None when it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Delete the object. Deleting a nonexistent key is success.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-compatible implementation of ObjectStore.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &Config) -> Self {
        let credentials = Credentials::new(
            config.s3_access_key.clone(),
            config.s3_secret_key.clone(),
            None,
            None,
            "filebeam",
        );
        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.s3_region.clone()))
            .endpoint_url(config.s3_endpoint.clone())
            .credentials_provider(credentials)
            // MinIO and most self-hosted stores want path-style addressing.
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.s3_bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        size_bytes: i64,
        mime_type: &str,
        ttl: Duration,
    ) -> Result<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size_bytes)
            .content_type(mime_type)
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .context("presigning PUT failed")?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, key: &str, filename: &str, ttl: Duration) -> Result<String> {
        let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(filename));
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(disposition)
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .context("presigning GET failed")?;
        Ok(presigned.uri().to_string())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectMeta {
                size_bytes: output.content_length().unwrap_or(0),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow::Error::new(service_err).context("HEAD failed"))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 DELETE is idempotent; a missing key still returns success.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("DELETE failed")?;
        Ok(())
    }
}

/// Allocate a fresh share id: 16 random bytes, URL-safe base64 (22 chars).
pub fn new_share_id() -> String {
    let bytes: [u8; 16] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the storage key for a share. Deterministic so retries of the
/// same share always address the same object.
pub fn storage_key(share_id: &str, filename: &str) -> String {
    format!("{}/{}", share_id, sanitize_filename(filename))
}

/// Max filename length carried into storage keys and dispositions.
const MAX_KEY_FILENAME_LEN: usize = 120;

/// Normalize a client-supplied filename to a safe charset: path
/// separators and anything outside `[A-Za-z0-9._-]` become underscores,
/// leading dots are stripped, and length is bounded.
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Leading dots (and the underscores that replaced path separators)
    // would produce hidden-file names or keep `../` residue.
    let mut safe = mapped.trim_start_matches(['.', '_']).to_string();
    safe.truncate(MAX_KEY_FILENAME_LEN);

    if safe.is_empty() {
        "file".to_string()
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("dir\\file.txt"), "dir_file.txt");
    }

    #[test]
    fn sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("report-2024_v2.pdf"), "report-2024_v2.pdf");
    }

    #[test]
    fn sanitize_replaces_unicode_and_spaces() {
        assert_eq!(sanitize_filename("naïve file.pdf"), "na_ve_file.pdf");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn sanitize_bounds_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_filename(&long).len(), MAX_KEY_FILENAME_LEN);
    }

    #[test]
    fn storage_key_prefixes_share_id() {
        assert_eq!(
            storage_key("abc123", "report.pdf"),
            "abc123/report.pdf"
        );
    }

    #[test]
    fn share_ids_are_url_safe_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = new_share_id();
            assert_eq!(id.len(), 22);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
            assert!(seen.insert(id));
        }
    }
}
