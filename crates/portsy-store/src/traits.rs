use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// A presigned request: a URL a client may use without store credentials
/// until `expires_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresignedRequest {
    pub url: String,
    pub expires_at: SystemTime,
}

/// Content-addressed blob store.
///
/// Contracts every backend must satisfy:
/// - `exists` maps a not-found status to `Ok(false)`, never an error.
/// - `upload_if_missing` is idempotent: a conditional put where "the object
///   is already there" counts as success. Callers need not check `exists`
///   first (but may, for latency).
/// - `copy_if_missing` is a server-side copy; identity when the keys are
///   equal; silent success when the target already exists.
/// - `download_to` is atomic: the target file either appears complete or
///   not at all, and no `<target>.part` remnant survives a failure.
/// - Retries are the caller's responsibility; errors are per-operation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// The object key for `hash_hex` under `project`, per this store's
    /// configured key scheme.
    fn build_key(&self, project: &str, hash_hex: &str) -> String;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Upload the file at `local` to `key` unless the object already exists.
    async fn upload_if_missing(&self, local: &Path, key: &str) -> StoreResult<()>;

    /// Upload in-memory content to `key` (overwrites; used for self-test
    /// pings and other non-content-addressed writes).
    async fn upload_reader(&self, data: Bytes, key: &str) -> StoreResult<()>;

    /// Server-side copy from `from_key` to `to_key` unless the target
    /// already exists.
    async fn copy_if_missing(&self, from_key: &str, to_key: &str) -> StoreResult<()>;

    /// Atomically download `key` to `dest`, creating parent directories.
    async fn download_to(&self, key: &str, dest: &Path) -> StoreResult<()>;

    /// Download `key` into memory. Intended for small objects (previous
    /// session revisions); large blobs go through `download_to`.
    async fn download_bytes(&self, key: &str) -> StoreResult<Bytes>;

    /// Delete `key`. Used by self-tests and external sweepers, never by the
    /// commit protocol.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Issue a presigned download URL for `key`, valid for `ttl` (or the
    /// backend's configured default). Not part of the commit protocol;
    /// backends without a URL scheme return `Unsupported`.
    async fn presign_get(
        &self,
        _key: &str,
        _ttl: Option<Duration>,
    ) -> StoreResult<PresignedRequest> {
        Err(StoreError::Unsupported("presigned GET"))
    }

    /// Issue a presigned upload URL for `key`.
    async fn presign_put(
        &self,
        _key: &str,
        _ttl: Option<Duration>,
    ) -> StoreResult<PresignedRequest> {
        Err(StoreError::Unsupported("presigned PUT"))
    }
}
