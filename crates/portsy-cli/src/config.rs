use std::path::PathBuf;
use std::sync::Arc;

use portsy_engine::{SyncEngine, SyncEngineOptions};
use portsy_meta::FsMetaStore;
use portsy_store::{BlobStoreConfig, FsBlobStore};
use portsy_types::HashAlgo;

/// Environment variables consumed at bootstrap. The engine crates never
/// read the environment themselves.
const ENV_DATA_DIR: &str = "PORTSY_DATA_DIR";
const ENV_ALGO: &str = "PORTSY_ALGO";
const ENV_KEY_PREFIX: &str = "PORTSY_KEY_PREFIX";
const ENV_USER: &str = "PORTSY_USER";

/// Where the local store backends live.
pub fn data_dir() -> PathBuf {
    std::env::var_os(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("portsy-data"))
}

/// Build the engine from the environment: blob objects under
/// `<data>/blobs`, metadata documents under `<data>/meta`.
pub fn engine_from_env() -> SyncEngine {
    let data = data_dir();

    let blob_config = BlobStoreConfig {
        key_prefix: std::env::var(ENV_KEY_PREFIX).ok().filter(|p| !p.is_empty()),
        ..Default::default()
    };
    let blobs = Arc::new(FsBlobStore::with_config(data.join("blobs"), blob_config));
    let meta = Arc::new(FsMetaStore::new(data.join("meta")));

    let options = SyncEngineOptions {
        algo: std::env::var(ENV_ALGO)
            .map(|v| HashAlgo::parse_lossy(&v))
            .unwrap_or_default(),
        user_id: std::env::var(ENV_USER).ok().filter(|u| !u.is_empty()),
        ..Default::default()
    };
    SyncEngine::with_options(meta, blobs, Arc::new(portsy_engine::NullSink), options)
}
