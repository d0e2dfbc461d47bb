use std::path::PathBuf;
use std::process::ExitCode;

use bisync_core::{Engine, EngineSeverity, ProcessTransferDriver, RealFileSystem, RunContext, RunLock};
use clap::Parser;

/// Reconcile a local directory tree with a remote cloud-storage tree.
#[derive(Parser)]
#[command(name = "bisync", about = "Bidirectional sync reconciliation engine")]
struct Cli {
    /// Name identifying this remote (used for snapshot and lock file naming)
    remote_name: String,

    /// Local root directory to sync
    local_root: String,

    /// Resolved remote root path
    #[arg(long)]
    remote_root: String,

    /// Initialize snapshots from current state instead of reconciling
    #[arg(long)]
    first_sync: bool,

    /// Verify the sentinel file exists on both sides before syncing
    #[arg(long)]
    check_access: bool,

    /// Bypass the excess-deletion safety guard
    #[arg(long)]
    force: bool,

    /// Run without issuing any mutating transfer-driver calls
    #[arg(long)]
    dry_run: bool,

    /// File listing exclude patterns, passed to every list/sync call
    #[arg(long)]
    exclude_list_file: Option<PathBuf>,

    /// Working directory for snapshot and lock files
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Maximum allowed deletion percentage before the safety guard aborts
    #[arg(long, default_value_t = 50.0)]
    max_delta: f64,

    /// Transfer utility binary to shell out to (also read from BISYNC_TRANSFER_BIN)
    #[arg(long)]
    transfer_bin: Option<String>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let workdir = cli
        .workdir
        .unwrap_or_else(|| std::env::temp_dir().join("bisync"));
    if let Err(e) = std::fs::create_dir_all(&workdir) {
        log::error!("could not create working directory {}: {e}", workdir.display());
        return ExitCode::from(1);
    }

    let transfer_bin = cli
        .transfer_bin
        .or_else(|| std::env::var("BISYNC_TRANSFER_BIN").ok())
        .unwrap_or_else(|| "rclone".to_string());

    let lock_fs = RealFileSystem::new();
    let lock_path = workdir.join(format!("{}_LOCK", cli.remote_name));
    let owner = format!("pid:{}", std::process::id());
    let _lock = match RunLock::acquire(&lock_fs, &lock_path, &owner) {
        Ok(lock) => lock,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let context = RunContext {
        workdir,
        remote_name: cli.remote_name,
        local_root: cli.local_root,
        remote_root: cli.remote_root,
        first_sync: cli.first_sync,
        check_access: cli.check_access,
        force: cli.force,
        dry_run: cli.dry_run,
        max_delta: cli.max_delta / 100.0,
        exclude_list_file: cli.exclude_list_file,
    };

    let driver = ProcessTransferDriver::new(transfer_bin);
    let engine = Engine::new(context, Box::new(RealFileSystem::new()), Box::new(driver));

    ExitCode::from(match engine.run() {
        Ok(outcome) => {
            log::info!(
                "sync complete: {} copied to local, {} deleted locally, {} conflicts",
                outcome.copied_to_local,
                outcome.deleted_local,
                outcome.conflicts
            );
            0
        }
        Err(EngineSeverity::Abort(msg)) => {
            log::error!("aborted: {msg}");
            1
        }
        Err(EngineSeverity::Critical(msg)) => {
            log::error!("critical failure: {msg}");
            2
        }
    })
}
