use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use portsy_diff::ChangeKind;
use portsy_engine::{PullOptions, SyncEngine};
use portsy_meta::MetaStore;
use portsy_scan::scan_projects;
use portsy_store::BlobStore;
use portsy_types::{AbletonProject, CommitMeta, ProjectState};
use portsy_watch::{watch_fleet, watch_project, SaveEvent, WatcherConfig};

use crate::cli::{Cli, Command};
use crate::config::engine_from_env;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Scan(args) => scan(&args.root, args.json),
        Command::Pending(args) => pending(&engine_from_env(), &args.root, args.json).await,
        Command::Projects(args) => projects(&engine_from_env(), &args.root, args.json).await,
        Command::Diff(args) => diff(&engine_from_env(), &args.root, &args.project, args.json).await,
        Command::Push(args) => push(&engine_from_env(), &args.root, &args.project, &args.msg).await,
        Command::Pull(args) => {
            let dest = args.dest.unwrap_or_else(|| PathBuf::from(&args.project));
            pull(
                &engine_from_env(),
                &args.project,
                &dest,
                args.commit,
                args.force,
            )
            .await
        }
        Command::Rollback(args) => {
            let dest = args.dest.unwrap_or_else(|| PathBuf::from(&args.project));
            rollback(&engine_from_env(), &args.project, &args.commit, &dest).await
        }
        Command::Watch(args) => {
            watch(engine_from_env(), args.root, args.project, args.autopush).await
        }
        Command::Selftest(_) => selftest(&engine_from_env()).await,
    }
}

fn scan(root: &Path, json: bool) -> anyhow::Result<()> {
    let projects = scan_projects(root)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }
    if projects.is_empty() {
        println!("no projects under {}", root.display());
        return Ok(());
    }
    for p in projects {
        let marker = if p.has_portsy { "tracked" } else { "new" };
        println!("{:<30} {:<8} {}", p.name, marker, p.als_file);
    }
    Ok(())
}

async fn pending(engine: &SyncEngine, root: &Path, json: bool) -> anyhow::Result<()> {
    let changes = engine.pending_changes(root).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("everything in sync");
        return Ok(());
    }
    for c in changes {
        println!(
            "{:<30} +{} ~{} -{} ({} total)",
            c.name, c.added, c.modified, c.deleted, c.total
        );
    }
    Ok(())
}

async fn projects(engine: &SyncEngine, root: &Path, json: bool) -> anyhow::Result<()> {
    let rows = engine.project_summaries(root).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        let standing = if row.path.is_empty() {
            "remote-only"
        } else if row.created_locally {
            "local-only"
        } else if row.has_local_changes {
            "changed"
        } else {
            "in sync"
        };
        let head = row.last_commit_id.as_deref().unwrap_or("-");
        println!("{:<30} {:<12} head={head}", row.name, standing);
    }
    Ok(())
}

async fn diff(
    engine: &SyncEngine,
    root: &Path,
    project: &str,
    json: bool,
) -> anyhow::Result<()> {
    let project = find_project(root, project)?;
    let (diff, logical) = engine.diff_project(&project).await?;

    if json {
        let body = json!({
            "added": diff.paths(ChangeKind::Added),
            "changed": diff.paths(ChangeKind::Modified),
            "removed": diff.paths(ChangeKind::Deleted),
            "logical": logical,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if diff.is_empty() {
        println!("{}: no changes", project.name);
        return Ok(());
    }
    for c in &diff.changes {
        println!("{:<9} {}", c.kind.to_string(), c.path);
    }
    if let Some(logical) = logical {
        for s in &logical.samples.added {
            println!("sample +  {s}");
        }
        for s in &logical.samples.removed {
            println!("sample -  {s}");
        }
        for s in &logical.samples.changed {
            println!("sample ~  {s}");
        }
        for c in &logical.midi.added_clips {
            println!("clip   +  {c}");
        }
        for c in &logical.midi.removed_clips {
            println!("clip   -  {c}");
        }
        for c in &logical.midi.changed_clips {
            println!("clip   ~  {c}");
        }
    }
    Ok(())
}

async fn push(
    engine: &SyncEngine,
    root: &Path,
    project: &str,
    message: &str,
) -> anyhow::Result<()> {
    let project = find_project(root, project)?;
    let cancel = cancel_on_ctrl_c();
    let outcome = engine.push(&project, message, &cancel).await?;
    println!(
        "pushed {} as {} (uploaded {}, migrated {}, carried {})",
        project.name, outcome.commit_id, outcome.uploaded, outcome.migrated, outcome.carried
    );
    Ok(())
}

async fn pull(
    engine: &SyncEngine,
    project: &str,
    dest: &Path,
    commit: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let cancel = cancel_on_ctrl_c();
    let stats = engine
        .pull(
            project,
            dest,
            PullOptions {
                commit_id: commit,
                allow_delete: force,
            },
            &cancel,
        )
        .await?;
    println!(
        "pulled {project}: downloaded {}/{} (skipped {}, deleted {})",
        stats.downloaded, stats.to_download, stats.skipped, stats.deleted
    );
    Ok(())
}

async fn rollback(
    engine: &SyncEngine,
    project: &str,
    commit: &str,
    dest: &Path,
) -> anyhow::Result<()> {
    let cancel = cancel_on_ctrl_c();
    engine.rollback(project, commit, dest, &cancel).await?;
    println!("rolled back {project} to {commit}");
    Ok(())
}

async fn watch(
    engine: SyncEngine,
    root: PathBuf,
    only_project: Option<String>,
    autopush: bool,
) -> anyhow::Result<()> {
    let engine = Arc::new(engine);
    let cancel = cancel_on_ctrl_c();
    engine.set_watcher(cancel.clone());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SaveEvent>();
    let on_save: portsy_watch::SaveCallback = Arc::new(move |ev| {
        let _ = tx.send(ev);
    });

    let config = WatcherConfig::default();
    let watch_task = match only_project {
        Some(name) => {
            let project = find_project(&root, &name)?;
            tokio::spawn(watch_project(
                project.name,
                PathBuf::from(project.path),
                config,
                cancel.clone(),
                on_save,
            ))
        }
        None => tokio::spawn(watch_fleet(root.clone(), config, cancel.clone(), on_save)),
    };

    info!(root = %root.display(), autopush, "watching; ctrl-c to stop");
    while let Some(save) = rx.recv().await {
        println!(
            "save detected: {} ({})",
            save.project_name,
            save.als_path.display()
        );
        engine.emit(portsy_engine::Event::AlsSaved {
            project: save.project_name.clone(),
            path: save.als_path.to_string_lossy().into_owned(),
            at: save.detected_at,
        });
        let project = AbletonProject {
            name: save.project_name.clone(),
            path: save.project_path.to_string_lossy().into_owned(),
            als_file: save.als_path.to_string_lossy().into_owned(),
            has_portsy: save.project_path.join(".portsy").is_dir(),
        };
        if autopush {
            let message = format!("auto: save at {}", save.detected_at.to_rfc3339());
            match engine.push(&project, &message, &cancel).await {
                Ok(outcome) => println!("pushed {} as {}", project.name, outcome.commit_id),
                Err(err) => eprintln!("autopush failed for {}: {err}", project.name),
            }
        } else {
            match engine.diff_project(&project).await {
                Ok((diff, _)) => println!(
                    "{}: +{} ~{} -{}",
                    project.name,
                    diff.added(),
                    diff.modified(),
                    diff.deleted()
                ),
                Err(err) => eprintln!("diff failed for {}: {err}", project.name),
            }
        }
    }

    watch_task.await??;
    Ok(())
}

/// Round-trip a ping object through both stores, then clean up.
async fn selftest(engine: &SyncEngine) -> anyhow::Result<()> {
    let key = format!("selftest/{}.txt", Uuid::new_v4());
    let blobs = engine.blobs();
    blobs
        .upload_reader(Bytes::from_static(b"portsy ping"), &key)
        .await?;
    if !blobs.exists(&key).await? {
        bail!("blob store: object missing after upload");
    }
    let body = blobs.download_bytes(&key).await?;
    if body.as_ref() != b"portsy ping" {
        bail!("blob store: payload mismatch");
    }
    blobs.delete(&key).await?;
    println!("blob store: upload/head/download/delete ok");

    let project = "portsy-selftest";
    let commit = CommitMeta::new(Uuid::new_v4().to_string(), "selftest", 0);
    let state = ProjectState::new(project, "/dev/null", engine.options().algo, vec![], 0);
    engine
        .meta()
        .upsert_latest_state(project, &state, &commit)
        .await?;
    let (_, read_back) = engine
        .meta()
        .get_latest_state(project)
        .await?
        .context("metadata store: state missing after write")?;
    if read_back.id != commit.id {
        bail!("metadata store: roundtrip mismatch");
    }
    println!("metadata store: write/read ok");
    Ok(())
}

fn find_project(root: &Path, name: &str) -> anyhow::Result<AbletonProject> {
    let projects = scan_projects(root)?;
    projects
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .with_context(|| format!("no project named {name:?} under {}", root.display()))
}

/// A token that fires on ctrl-c.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}
