use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "portsy",
    about = "Content-addressed version control for Ableton Live projects",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the projects under a root folder
    Scan(ScanArgs),
    /// Show projects with uncommitted local changes
    Pending(PendingArgs),
    /// Combined local + remote project overview
    Projects(ProjectsArgs),
    /// Diff one project against its last synced state
    Diff(DiffArgs),
    /// Push a project to the remote stores
    Push(PushArgs),
    /// Pull a project from the remote stores
    Pull(PullArgs),
    /// Restore a project to an earlier commit (pull + prune)
    Rollback(RollbackArgs),
    /// Watch a root (or one project) and react to session saves
    Watch(WatchArgs),
    /// Round-trip a ping object through the configured stores
    Selftest(SelftestArgs),
}

#[derive(Args)]
pub struct ScanArgs {
    /// Root folder holding project directories
    #[arg(long)]
    pub root: PathBuf,
    /// Machine-readable output on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PendingArgs {
    #[arg(long)]
    pub root: PathBuf,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ProjectsArgs {
    #[arg(long)]
    pub root: PathBuf,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    #[arg(long)]
    pub root: PathBuf,
    /// Project name (folder name under the root)
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PushArgs {
    #[arg(long)]
    pub root: PathBuf,
    #[arg(long)]
    pub project: String,
    /// Commit message
    #[arg(short, long)]
    pub msg: String,
}

#[derive(Args)]
pub struct PullArgs {
    #[arg(long)]
    pub project: String,
    /// Destination folder; defaults to ./<project>
    #[arg(long)]
    pub dest: Option<PathBuf>,
    /// Pull a specific commit instead of HEAD
    #[arg(long)]
    pub commit: Option<String>,
    /// Delete local files not present in the pulled state
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct RollbackArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub commit: String,
    #[arg(long)]
    pub dest: Option<PathBuf>,
}

#[derive(Args)]
pub struct WatchArgs {
    #[arg(long)]
    pub root: PathBuf,
    /// Watch a single project instead of the whole root
    #[arg(long)]
    pub project: Option<String>,
    /// Push automatically after each stable save
    #[arg(long)]
    pub autopush: bool,
}

#[derive(Args)]
pub struct SelftestArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scan_json() {
        let cli = Cli::try_parse_from(["portsy", "scan", "--root", "/music", "--json"]).unwrap();
        if let Command::Scan(args) = cli.command {
            assert_eq!(args.root, PathBuf::from("/music"));
            assert!(args.json);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_pending() {
        let cli = Cli::try_parse_from(["portsy", "pending", "--root", "."]).unwrap();
        assert!(matches!(cli.command, Command::Pending(_)));
    }

    #[test]
    fn parse_projects() {
        let cli = Cli::try_parse_from(["portsy", "projects", "--root", ".", "--json"]).unwrap();
        if let Command::Projects(args) = cli.command {
            assert!(args.json);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_diff_requires_project() {
        assert!(Cli::try_parse_from(["portsy", "diff", "--root", "."]).is_err());
        let cli =
            Cli::try_parse_from(["portsy", "diff", "--root", ".", "--project", "Set"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert_eq!(args.project, "Set");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_push() {
        let cli = Cli::try_parse_from([
            "portsy", "push", "--root", ".", "--project", "Set", "-m", "first cut",
        ])
        .unwrap();
        if let Command::Push(args) = cli.command {
            assert_eq!(args.msg, "first cut");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_pull_defaults() {
        let cli = Cli::try_parse_from(["portsy", "pull", "--project", "Set"]).unwrap();
        if let Command::Pull(args) = cli.command {
            assert!(args.dest.is_none());
            assert!(args.commit.is_none());
            assert!(!args.force);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_pull_with_commit_and_force() {
        let cli = Cli::try_parse_from([
            "portsy", "pull", "--project", "Set", "--commit", "abc", "--force",
        ])
        .unwrap();
        if let Command::Pull(args) = cli.command {
            assert_eq!(args.commit.as_deref(), Some("abc"));
            assert!(args.force);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_rollback() {
        let cli = Cli::try_parse_from([
            "portsy", "rollback", "--project", "Set", "--commit", "abc",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Rollback(_)));
    }

    #[test]
    fn parse_watch_autopush() {
        let cli =
            Cli::try_parse_from(["portsy", "watch", "--root", ".", "--autopush"]).unwrap();
        if let Command::Watch(args) = cli.command {
            assert!(args.autopush);
            assert!(args.project.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_selftest() {
        let cli = Cli::try_parse_from(["portsy", "selftest"]).unwrap();
        assert!(matches!(cli.command, Command::Selftest(_)));
    }
}
