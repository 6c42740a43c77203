use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::BlobStoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::key::KeyScheme;
use crate::traits::BlobStore;

/// Blob store backed by a local directory, laid out by object key.
///
/// The conditional-put contract is implemented with `create_new` opens: the
/// first writer wins and every later writer sees "already exists" as
/// success, exactly like a conditional PUT against a remote store.
/// `copy_if_missing` is a filesystem copy — the "server side" is this
/// directory.
pub struct FsBlobStore {
    root: PathBuf,
    scheme: KeyScheme,
    presign_ttl: std::time::Duration,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, BlobStoreConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: BlobStoreConfig) -> Self {
        let config = config.normalized();
        Self {
            root: root.into(),
            scheme: KeyScheme::new(config.key_prefix),
            presign_ttl: config.presign_ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        // Keys are forward-slashed; rebuild them as native paths.
        let mut path = self.root.clone();
        for seg in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(seg);
        }
        path
    }
}

/// Write `data` to `dest` atomically via `<dest>.part`: write, fsync,
/// rename, fsync of the parent directory. On failure the partial file is
/// removed and no target appears.
fn atomic_write(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    atomic_write_via(dest, &part_path(dest), data)
}

/// Like [`atomic_write`] but staged through a part file unique to this
/// writer, for store-internal writes where concurrent writers of the same
/// key are legal.
fn atomic_write_unique(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let part = part_path(dest).with_extension(format!(
        "part.{}.{seq}",
        std::process::id()
    ));
    atomic_write_via(dest, &part, data)
}

fn atomic_write_via(dest: &Path, part: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let result = (|| {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&part)?;
        f.write_all(data)?;
        f.sync_all()?;
        drop(f);
        fs::rename(&part, dest)?;
        if let Some(parent) = dest.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn build_key(&self, project: &str, hash_hex: &str) -> String {
        self.scheme.build(project, hash_hex)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.object_path(key);
        let exists = tokio::task::spawn_blocking(move || path.is_file())
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(exists)
    }

    async fn upload_if_missing(&self, local: &Path, key: &str) -> StoreResult<()> {
        let src = local.to_path_buf();
        let dest = self.object_path(key);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            // Conditional put: an object at the key wins over any new write.
            // Racing writers of the same content-address carry identical
            // bytes, and each stages through its own unique part file, so
            // whichever rename lands last changes nothing.
            if dest.is_file() {
                debug!(key = %key, "object already present; skipping upload");
                return Ok(());
            }
            let data = fs::read(&src)?;
            atomic_write_unique(&dest, &data)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?
    }

    async fn upload_reader(&self, data: Bytes, key: &str) -> StoreResult<()> {
        let dest = self.object_path(key);
        tokio::task::spawn_blocking(move || atomic_write_unique(&dest, &data))
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?
            .map_err(StoreError::Io)
    }

    async fn copy_if_missing(&self, from_key: &str, to_key: &str) -> StoreResult<()> {
        if from_key == to_key {
            return Ok(());
        }
        let from = self.object_path(from_key);
        let to = self.object_path(to_key);
        let from_key = from_key.to_string();
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            if to.is_file() {
                return Ok(());
            }
            if !from.is_file() {
                return Err(StoreError::NotFound(from_key));
            }
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            let data = fs::read(&from)?;
            atomic_write_unique(&to, &data)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?
    }

    async fn download_to(&self, key: &str, dest: &Path) -> StoreResult<()> {
        let src = self.object_path(key);
        let dest = dest.to_path_buf();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            if !src.is_file() {
                return Err(StoreError::NotFound(key));
            }
            let data = fs::read(&src)?;
            atomic_write(&dest, &data)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?
    }

    async fn download_bytes(&self, key: &str) -> StoreResult<Bytes> {
        let src = self.object_path(key);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> StoreResult<Bytes> {
            match fs::read(&src) {
                Ok(data) => Ok(Bytes::from(data)),
                Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key)),
                Err(err) => Err(err.into()),
            }
        })
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.object_path(key);
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?
    }

    async fn presign_get(
        &self,
        key: &str,
        ttl: Option<std::time::Duration>,
    ) -> StoreResult<crate::traits::PresignedRequest> {
        // The local backend has no credentials to elide; a file URL with an
        // advisory expiry is this store's rendition of a signed link.
        let path = self.object_path(key);
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(crate::traits::PresignedRequest {
            url: format!("file://{}", path.to_string_lossy().replace('\\', "/")),
            expires_at: std::time::SystemTime::now() + ttl.unwrap_or(self.presign_ttl),
        })
    }

    async fn presign_put(
        &self,
        key: &str,
        ttl: Option<std::time::Duration>,
    ) -> StoreResult<crate::traits::PresignedRequest> {
        let path = self.object_path(key);
        Ok(crate::traits::PresignedRequest {
            url: format!("file://{}", path.to_string_lossy().replace('\\', "/")),
            expires_at: std::time::SystemTime::now() + ttl.unwrap_or(self.presign_ttl),
        })
    }
}
