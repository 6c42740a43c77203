//! End-to-end push/pull against the in-memory stores.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use portsy_cache::LocalCache;
use portsy_engine::{ChannelBus, Event, PullOptions, SyncEngine, SyncEngineOptions, SyncError};
use portsy_hash::Hasher;
use portsy_meta::{MemoryMetaStore, MetaStore};
use portsy_scan::build_manifest;
use portsy_store::{BlobStore, BlobStoreConfig, MemoryBlobStore};
use portsy_types::{AbletonProject, CasePolicy, CommitStatus, HashAlgo};

fn project_fixture(dir: &Path) -> AbletonProject {
    std::fs::create_dir_all(dir.join("Samples")).unwrap();
    std::fs::write(dir.join("track.als"), b"session-bytes-v1").unwrap();
    std::fs::write(dir.join("Samples/kick.wav"), b"kick-bytes").unwrap();
    AbletonProject {
        name: "proj".into(),
        path: dir.to_string_lossy().into_owned(),
        als_file: dir.join("track.als").to_string_lossy().into_owned(),
        has_portsy: false,
    }
}

fn engine_with(
    meta: Arc<MemoryMetaStore>,
    blobs: Arc<MemoryBlobStore>,
) -> SyncEngine {
    SyncEngine::with_options(
        meta,
        blobs,
        Arc::new(portsy_engine::NullSink),
        SyncEngineOptions {
            algo: HashAlgo::Sha256,
            case_policy: CasePolicy::Preserve,
            workers: 2,
            user_id: None,
        },
    )
}

#[tokio::test]
async fn first_push_uploads_everything() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(Arc::clone(&meta), Arc::clone(&blobs));

    let outcome = engine
        .push(&project, "init", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.uploaded, 2);
    assert_eq!(outcome.migrated + outcome.carried, 0);

    // Blobs landed at content-addressed keys.
    let hasher = Hasher::new(HashAlgo::Sha256);
    let als_hash = hasher.hash_bytes(b"session-bytes-v1");
    let kick_hash = hasher.hash_bytes(b"kick-bytes");
    assert!(blobs.exists(&format!("proj/blobs/{als_hash}")).await.unwrap());
    assert!(blobs.exists(&format!("proj/blobs/{kick_hash}")).await.unwrap());

    // HEAD advanced to a final commit whose state carries blob keys.
    let (state, commit) = meta.get_latest_state("proj").await.unwrap().unwrap();
    assert_eq!(commit.id, outcome.commit_id);
    assert_eq!(commit.status, CommitStatus::Final);
    assert!(state.files.iter().all(|f| f.blob_key.is_some()));

    let docs = meta.list_projects().await.unwrap();
    assert_eq!(docs[0].last5, vec![outcome.commit_id.clone()]);

    // Local cache mirrors the pushed manifest.
    let cache = LocalCache::load(dir.path(), CasePolicy::Preserve).unwrap();
    assert_eq!(cache.manifest.get("track.als").map(String::as_str), Some(als_hash.as_str()));
    assert_eq!(
        cache.manifest.get("Samples/kick.wav").map(String::as_str),
        Some(kick_hash.as_str())
    );
}

#[tokio::test]
async fn noop_push_uploads_nothing_but_commits() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(Arc::clone(&meta), Arc::clone(&blobs));
    let cancel = CancellationToken::new();

    let first = engine.push(&project, "init", &cancel).await.unwrap();
    let uploads_after_first = blobs.upload_count();

    let second = engine.push(&project, "again", &cancel).await.unwrap();
    assert_eq!(blobs.upload_count(), uploads_after_first, "no new content transfers");
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.carried, 2);
    assert_ne!(first.commit_id, second.commit_id);

    // Commit identity is caller-controlled: the second push is a new record.
    let docs = meta.list_projects().await.unwrap();
    assert_eq!(docs[0].last5.len(), 2);
    assert_eq!(meta.commit_count("proj"), 2);
}

#[tokio::test]
async fn key_migration_copies_without_reupload() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let meta = Arc::new(MemoryMetaStore::new());

    // First push under the unprefixed scheme.
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(Arc::clone(&meta), Arc::clone(&blobs));
    engine
        .push(&project, "init", &CancellationToken::new())
        .await
        .unwrap();
    let uploads_before = blobs.upload_count();

    // Same backing objects, new key scheme (prefix added).
    let prefixed = Arc::new(MemoryBlobStore::with_config(BlobStoreConfig {
        key_prefix: Some("env".into()),
        ..Default::default()
    }));
    // Seed the prefixed store with the old objects under their old keys, as
    // the same bucket would contain them.
    for f in meta
        .get_latest_state("proj")
        .await
        .unwrap()
        .unwrap()
        .0
        .files
    {
        let old_key = f.blob_key.unwrap();
        let data = blobs.get(&old_key).unwrap();
        prefixed.upload_reader(data, &old_key).await.unwrap();
    }
    let seeded_uploads = prefixed.upload_count();

    let engine2 = engine_with(Arc::clone(&meta), Arc::clone(&prefixed));
    let outcome = engine2
        .push(&project, "migrate", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.uploaded, 0, "zero content uploads");
    assert_eq!(outcome.migrated, 2);
    assert_eq!(prefixed.upload_count(), seeded_uploads);
    assert_eq!(prefixed.copy_count(), 2);

    // New keys recorded; old keys remain (no delete).
    let (state, _) = meta.get_latest_state("proj").await.unwrap().unwrap();
    for f in &state.files {
        let key = f.blob_key.as_deref().unwrap();
        assert!(key.starts_with("env/proj/blobs/"));
        assert!(prefixed.exists(key).await.unwrap());
    }
    assert_eq!(uploads_before, blobs.upload_count());
}

#[tokio::test]
async fn crash_between_begin_and_finalize_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(Arc::clone(&meta), Arc::clone(&blobs));

    // Simulate the crash: blobs uploaded and commit begun, never finalized.
    let mut state =
        build_manifest(dir.path(), "proj", HashAlgo::Sha256, CasePolicy::Preserve).unwrap();
    state.project_path = project.path.clone();
    for f in &mut state.files {
        let key = blobs.build_key("proj", &f.hash);
        blobs
            .upload_if_missing(&dir.path().join(&f.path), &key)
            .await
            .unwrap();
        f.blob_key = Some(key);
    }
    let commit_id = "crashed-commit-id".to_string();
    let commit = portsy_types::CommitMeta::new(commit_id.clone(), "interrupted", 50);
    meta.begin_commit("proj", &commit, &state).await.unwrap();
    assert!(meta.get_latest_state("proj").await.unwrap().is_none());
    let uploads_before_retry = blobs.upload_count();

    // Retry the same push under the same commit id.
    let outcome = engine
        .push_with_commit_id(
            &project,
            "interrupted",
            Some(commit_id.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.commit_id, commit_id);
    assert_eq!(blobs.upload_count(), uploads_before_retry, "blobs reused");

    // HEAD advanced exactly once.
    let (_, commit) = meta.get_latest_state("proj").await.unwrap().unwrap();
    assert_eq!(commit.id, commit_id);
    assert_eq!(commit.status, CommitStatus::Final);
    let docs = meta.list_projects().await.unwrap();
    assert_eq!(docs[0].last5, vec![commit_id]);
}

#[tokio::test]
async fn push_error_aborts_and_leaves_head_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(Arc::clone(&meta), Arc::clone(&blobs));

    let hasher = Hasher::new(HashAlgo::Sha256);
    let kick_hash = hasher.hash_bytes(b"kick-bytes");
    blobs.set_fault(Some(&kick_hash));

    let err = engine
        .push(&project, "will fail", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert!(meta.get_latest_state("proj").await.unwrap().is_none());

    // Clearing the fault lets the retry complete using what survived.
    blobs.set_fault(None);
    engine
        .push(&project, "retry", &CancellationToken::new())
        .await
        .unwrap();
    assert!(meta.get_latest_state("proj").await.unwrap().is_some());
}

#[tokio::test]
async fn pull_into_empty_dir_rebuilds_content() {
    let src = tempfile::tempdir().unwrap();
    let project = project_fixture(src.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(Arc::clone(&meta), Arc::clone(&blobs));
    let cancel = CancellationToken::new();
    engine.push(&project, "init", &cancel).await.unwrap();

    let dest = tempfile::tempdir().unwrap();
    let stats = engine
        .pull("proj", dest.path(), PullOptions::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.verified, 2);
    assert_eq!(stats.skipped, 0);
    assert_eq!(
        std::fs::read(dest.path().join("track.als")).unwrap(),
        b"session-bytes-v1"
    );
    assert_eq!(
        std::fs::read(dest.path().join("Samples/kick.wav")).unwrap(),
        b"kick-bytes"
    );

    // Round-trip law: rescanning the destination reproduces the manifest.
    let rescanned =
        build_manifest(dest.path(), "proj", HashAlgo::Sha256, CasePolicy::Preserve).unwrap();
    let (state, _) = meta.get_latest_state("proj").await.unwrap().unwrap();
    assert_eq!(rescanned.manifest(), state.manifest());

    // Second pull downloads nothing.
    let stats = engine
        .pull("proj", dest.path(), PullOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(stats.downloaded, 0);
    assert_eq!(stats.skipped, 2);
}

#[tokio::test]
async fn pull_prunes_strays_only_when_allowed() {
    let src = tempfile::tempdir().unwrap();
    let project = project_fixture(src.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(meta, blobs);
    let cancel = CancellationToken::new();
    engine.push(&project, "init", &cancel).await.unwrap();

    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("stray.txt"), b"leftover").unwrap();
    std::fs::create_dir(dest.path().join(".portsy")).unwrap();
    std::fs::write(dest.path().join(".portsy/keep.json"), b"{}").unwrap();

    // allow_delete=false never deletes.
    let stats = engine
        .pull("proj", dest.path(), PullOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(stats.deleted, 0);
    assert!(dest.path().join("stray.txt").exists());

    let stats = engine
        .pull(
            "proj",
            dest.path(),
            PullOptions {
                allow_delete: true,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(stats.deleted, 1);
    assert!(!dest.path().join("stray.txt").exists());
    assert!(dest.path().join(".portsy/keep.json").exists());
}

#[tokio::test]
async fn rollback_restores_an_earlier_commit() {
    let src = tempfile::tempdir().unwrap();
    let project = project_fixture(src.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(meta, blobs);
    let cancel = CancellationToken::new();

    let first = engine.push(&project, "v1", &cancel).await.unwrap();
    std::fs::write(src.path().join("track.als"), b"session-bytes-v2").unwrap();
    engine.push(&project, "v2", &cancel).await.unwrap();

    engine
        .rollback("proj", &first.commit_id, src.path(), &cancel)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(src.path().join("track.als")).unwrap(),
        b"session-bytes-v1"
    );
}

#[tokio::test]
async fn pull_detects_corrupted_blob() {
    let src = tempfile::tempdir().unwrap();
    let project = project_fixture(src.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(meta, Arc::clone(&blobs));
    let cancel = CancellationToken::new();
    engine.push(&project, "init", &cancel).await.unwrap();

    // Corrupt the session blob in place: the key stays, the bytes lie.
    let hasher = Hasher::new(HashAlgo::Sha256);
    let als_hash = hasher.hash_bytes(b"session-bytes-v1");
    blobs
        .upload_reader(
            bytes::Bytes::from_static(b"tampered"),
            &format!("proj/blobs/{als_hash}"),
        )
        .await
        .unwrap();

    let dest = tempfile::tempdir().unwrap();
    let err = engine
        .pull("proj", dest.path(), PullOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::VerifyFailed { .. }));
    // The failed pull wrote no cache.
    assert!(!dest.path().join(".portsy/cache.json").exists());
}

#[tokio::test]
async fn pull_of_unknown_project_is_typed() {
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(meta, blobs);
    let dest = tempfile::tempdir().unwrap();

    let err = engine
        .pull(
            "ghost",
            dest.path(),
            PullOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Meta(portsy_meta::MetaError::NoSuchState { .. })
    ));
}

#[tokio::test]
async fn push_emits_push_done_event() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let (bus, mut rx) = ChannelBus::channel();
    let engine = SyncEngine::with_options(
        Arc::new(MemoryMetaStore::new()),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(bus),
        SyncEngineOptions {
            algo: HashAlgo::Sha256,
            case_policy: CasePolicy::Preserve,
            workers: 2,
            user_id: None,
        },
    );

    engine
        .push(&project, "init", &CancellationToken::new())
        .await
        .unwrap();

    let mut saw_push_done = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, Event::PushDone { ref project } if project == "proj") {
            saw_push_done = true;
        }
    }
    assert!(saw_push_done);
}

#[tokio::test]
async fn diff_project_reports_changes() {
    let dir = tempfile::tempdir().unwrap();
    let project = project_fixture(dir.path());
    let meta = Arc::new(MemoryMetaStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = engine_with(meta, blobs);
    let cancel = CancellationToken::new();

    // Everything is "added" before the first push.
    let (diff, _) = engine.diff_project(&project).await.unwrap();
    assert_eq!(diff.added(), 2);

    engine.push(&project, "init", &cancel).await.unwrap();
    let (diff, _) = engine.diff_project(&project).await.unwrap();
    assert!(diff.is_empty());

    std::fs::write(dir.path().join("Samples/kick.wav"), b"kick-v2").unwrap();
    let (diff, _) = engine.diff_project(&project).await.unwrap();
    assert_eq!(diff.modified(), 1);
}
