use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::BlobStoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::key::KeyScheme;
use crate::traits::BlobStore;

/// In-memory blob store for tests and embedding.
///
/// Implements the conditional-put contract exactly: a second upload of the
/// same key succeeds without touching the stored bytes, and the upload
/// counter lets tests assert how many content transfers actually happened.
pub struct MemoryBlobStore {
    scheme: KeyScheme,
    objects: RwLock<HashMap<String, Bytes>>,
    uploads: AtomicU64,
    copies: AtomicU64,
    /// When set, operations on keys containing this substring fail with a
    /// network error. Lets tests exercise worker-pool abort paths.
    fault: RwLock<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_config(BlobStoreConfig::default())
    }

    pub fn with_config(config: BlobStoreConfig) -> Self {
        let config = config.normalized();
        Self {
            scheme: KeyScheme::new(config.key_prefix),
            objects: RwLock::new(HashMap::new()),
            uploads: AtomicU64::new(0),
            copies: AtomicU64::new(0),
            fault: RwLock::new(None),
        }
    }

    /// Number of content uploads that actually transferred bytes.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of server-side copies that actually ran.
    pub fn copy_count(&self) -> u64 {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Raw object bytes, if present.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().expect("lock poisoned").get(key).cloned()
    }

    /// Inject a failure: any operation on a key containing `needle` returns
    /// a network error until cleared with `None`.
    pub fn set_fault(&self, needle: Option<&str>) {
        *self.fault.write().expect("lock poisoned") = needle.map(str::to_string);
    }

    fn check_fault(&self, key: &str) -> StoreResult<()> {
        if let Some(needle) = self.fault.read().expect("lock poisoned").as_deref() {
            if key.contains(needle) {
                return Err(StoreError::Network(format!("injected fault on {key}")));
            }
        }
        Ok(())
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn build_key(&self, project: &str, hash_hex: &str) -> String {
        self.scheme.build(project, hash_hex)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check_fault(key)?;
        Ok(self.objects.read().expect("lock poisoned").contains_key(key))
    }

    async fn upload_if_missing(&self, local: &Path, key: &str) -> StoreResult<()> {
        self.check_fault(key)?;
        let data = Bytes::from(std::fs::read(local)?);
        let mut map = self.objects.write().expect("lock poisoned");
        if !map.contains_key(key) {
            map.insert(key.to_string(), data);
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn upload_reader(&self, data: Bytes, key: &str) -> StoreResult<()> {
        self.check_fault(key)?;
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), data);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn copy_if_missing(&self, from_key: &str, to_key: &str) -> StoreResult<()> {
        if from_key == to_key {
            return Ok(());
        }
        self.check_fault(to_key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(to_key) {
            return Ok(());
        }
        let Some(data) = map.get(from_key).cloned() else {
            return Err(StoreError::NotFound(from_key.to_string()));
        };
        map.insert(to_key.to_string(), data);
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download_to(&self, key: &str, dest: &Path) -> StoreResult<()> {
        let data = self.download_bytes(key).await?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Same .part discipline as real backends, so tests observe the
        // identical crash surface.
        let part = dest.with_extension(append_ext(dest, "part"));
        std::fs::write(&part, &data)?;
        std::fs::rename(&part, dest)?;
        Ok(())
    }

    async fn download_bytes(&self, key: &str) -> StoreResult<Bytes> {
        self.check_fault(key)?;
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_fault(key)?;
        self.objects.write().expect("lock poisoned").remove(key);
        Ok(())
    }
}

fn append_ext(path: &Path, ext: &str) -> String {
    match path.extension() {
        Some(existing) => format!("{}.{ext}", existing.to_string_lossy()),
        None => ext.to_string(),
    }
}
