use std::time::Duration;

/// Transfer tunables for blob store backends.
///
/// Backends that stream multipart honor `part_size`/`concurrency`; the
/// minimums match what S3-compatible stores accept.
#[derive(Clone, Debug)]
pub struct BlobStoreConfig {
    /// Optional key prefix ahead of `<project>/blobs/<hash>`.
    pub key_prefix: Option<String>,
    /// Multipart part size in bytes.
    pub part_size: u64,
    /// Concurrent parts per transfer.
    pub concurrency: usize,
    /// Default TTL for presigned URLs, where a backend can issue them.
    pub presign_ttl: Duration,
}

/// Smallest part size S3-compatible stores accept.
pub const MIN_PART_SIZE: u64 = 5 << 20; // 5 MiB
/// Floor for transfer parallelism.
pub const MIN_CONCURRENCY: usize = 2;

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: None,
            part_size: 8 << 20, // 8 MiB
            concurrency: 4,
            presign_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl BlobStoreConfig {
    /// Clamp tunables to their floors.
    pub fn normalized(mut self) -> Self {
        self.part_size = self.part_size.max(MIN_PART_SIZE);
        self.concurrency = self.concurrency.max(MIN_CONCURRENCY);
        self
    }
}
