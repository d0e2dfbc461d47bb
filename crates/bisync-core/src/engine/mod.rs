pub mod actions;

use std::path::PathBuf;

use thiserror::Error;

use crate::delta::{self, Delta};
use crate::file_system::FileSystem;
use crate::health;
use crate::listing::Listing;
use crate::snapshot::{Side, SnapshotStore};
use crate::transfer::TransferDriver;

use actions::PlannedAction;

/// Assembled run configuration (spec §9: replaces the source's
/// module-level globals with one value threaded through the engine).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub workdir: PathBuf,
    pub remote_name: String,
    pub local_root: String,
    pub remote_root: String,
    pub first_sync: bool,
    pub check_access: bool,
    pub force: bool,
    pub dry_run: bool,
    pub max_delta: f64,
    pub exclude_list_file: Option<PathBuf>,
}

/// The two non-fatal-to-retry severities a run can fail with (spec §7).
/// `Abort` leaves snapshots intact and is rerunnable as-is; `Critical`
/// quarantines both snapshots, requiring `--first-sync` to recover.
#[derive(Debug, Clone, Error)]
pub enum EngineSeverity {
    #[error("{0}")]
    Abort(String),

    #[error("{0}")]
    Critical(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub copied_to_local: usize,
    pub deleted_local: usize,
    pub conflicts: usize,
    pub first_sync: bool,
}

/// The Reconciliation Engine: orchestrates preconditions, the action
/// matrix, the post-pass tree-sync, and the snapshot refresh (spec §4.4).
pub struct Engine {
    context: RunContext,
    fs: Box<dyn FileSystem>,
    driver: Box<dyn TransferDriver>,
}

impl Engine {
    pub fn new(context: RunContext, fs: Box<dyn FileSystem>, driver: Box<dyn TransferDriver>) -> Self {
        Self { context, fs, driver }
    }

    pub fn run(&self) -> Result<RunOutcome, EngineSeverity> {
        let store = SnapshotStore::new(
            self.fs.as_ref(),
            &self.context.workdir,
            &self.context.remote_name,
            self.context.dry_run,
        );

        let result = self.try_run(&store);

        if let Err(EngineSeverity::Critical(ref msg)) = result {
            log::error!("critical failure, quarantining snapshots for {}: {msg}", self.context.remote_name);
            if let Err(e) = store.quarantine() {
                log::error!("failed to quarantine snapshots: {e}");
            }
        }

        result
    }

    fn try_run(&self, store: &SnapshotStore<'_>) -> Result<RunOutcome, EngineSeverity> {
        self.precondition_workdir()?;
        self.precondition_exclude_list_file()?;

        store
            .prepare_dry_run()
            .map_err(|e| EngineSeverity::Critical(format!("preparing dry-run snapshots: {e}")))?;

        let snapshot_exists = store.exists_for_remote();
        if !snapshot_exists && !self.context.first_sync {
            return Err(EngineSeverity::Abort(format!(
                "no snapshot found for remote {:?}; rerun with --first-sync",
                self.context.remote_name
            )));
        }

        if self.context.check_access {
            health::check(
                self.fs.as_ref(),
                store.paths(),
                self.driver.as_ref(),
                &self.context.local_root,
                &self.context.remote_root,
                self.context.dry_run,
            )
            .map_err(|e| EngineSeverity::Critical(format!("access health probe failed: {e}")))?;
        }

        let excludes = self
            .context
            .exclude_list_file
            .as_ref()
            .map(|p| p.display().to_string());

        let local_now = store
            .produce_current(Side::Local, self.driver.as_ref(), &self.context.local_root, excludes.as_deref())
            .map_err(|e| EngineSeverity::Critical(format!("listing local root failed: {e}")))?;
        let remote_now = store
            .produce_current(Side::Remote, self.driver.as_ref(), &self.context.remote_root, excludes.as_deref())
            .map_err(|e| EngineSeverity::Critical(format!("listing remote root failed: {e}")))?;

        if !snapshot_exists {
            self.run_first_sync(store, local_now, remote_now, excludes.as_deref())
        } else {
            self.run_reconciliation(store, local_now, remote_now, excludes.as_deref())
        }
    }

    fn precondition_workdir(&self) -> Result<(), EngineSeverity> {
        if !self.fs.exists(&self.context.workdir) {
            self.fs.create_dir_all(&self.context.workdir).map_err(|e| {
                EngineSeverity::Abort(format!(
                    "working directory {} does not exist and could not be created: {e}",
                    self.context.workdir.display()
                ))
            })?;
        }
        if !self.fs.is_dir(&self.context.workdir) {
            return Err(EngineSeverity::Abort(format!(
                "{} is not a directory",
                self.context.workdir.display()
            )));
        }
        Ok(())
    }

    /// Verify an `--exclude-list-file`, if given, exists before the run
    /// starts (spec §4.5) rather than letting a stale or typo'd path pass
    /// through silently to every transfer-driver call.
    fn precondition_exclude_list_file(&self) -> Result<(), EngineSeverity> {
        if let Some(path) = &self.context.exclude_list_file {
            if !self.fs.exists(path) {
                return Err(EngineSeverity::Abort(format!(
                    "exclude list file {} does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Initialize snapshots from current state without reconciling:
    /// remote-unique paths are copied to local, then both sides' current
    /// listings become the first authoritative snapshots (spec GLOSSARY,
    /// "First-sync").
    fn run_first_sync(
        &self,
        store: &SnapshotStore<'_>,
        local_now: Listing,
        remote_now: Listing,
        excludes: Option<&str>,
    ) -> Result<RunOutcome, EngineSeverity> {
        log::info!("first-sync: initializing snapshots for {}", self.context.remote_name);

        let mut copied = 0usize;
        for path in remote_now.paths() {
            if local_now.contains(path) {
                continue;
            }
            let src = format!("{}/{}", self.context.remote_root, path);
            let dst = format!("{}/{}", self.context.local_root, path);
            log::info!("first-sync copy remote -> local: {path}");
            self.driver
                .copy(&src, &dst, false, self.context.dry_run)
                .map_err(|e| EngineSeverity::Critical(format!("first-sync copy failed for {path}: {e}")))?;
            copied += 1;
        }

        let local_final = if copied > 0 {
            store
                .produce_current(Side::Local, self.driver.as_ref(), &self.context.local_root, excludes)
                .map_err(|e| EngineSeverity::Critical(format!("re-listing local root after first-sync: {e}")))?
        } else {
            local_now
        };

        store
            .commit(Side::Local, &local_final)
            .map_err(|e| EngineSeverity::Critical(format!("committing local snapshot: {e}")))?;
        store
            .commit(Side::Remote, &remote_now)
            .map_err(|e| EngineSeverity::Critical(format!("committing remote snapshot: {e}")))?;
        store
            .cleanup_transients()
            .map_err(|e| EngineSeverity::Critical(format!("cleaning up transient listings: {e}")))?;

        Ok(RunOutcome {
            copied_to_local: copied,
            first_sync: true,
            ..Default::default()
        })
    }

    fn run_reconciliation(
        &self,
        store: &SnapshotStore<'_>,
        local_now: Listing,
        remote_now: Listing,
        excludes: Option<&str>,
    ) -> Result<RunOutcome, EngineSeverity> {
        let local_prior = store
            .load_prior(Side::Local)
            .map_err(|e| EngineSeverity::Critical(format!("loading local snapshot: {e}")))?;
        let remote_prior = store
            .load_prior(Side::Remote)
            .map_err(|e| EngineSeverity::Critical(format!("loading remote snapshot: {e}")))?;

        let (local_delta, local_deleted) = delta::compute(&local_prior, &local_now);
        let (remote_delta, remote_deleted) = delta::compute(&remote_prior, &remote_now);

        log_delta("local", &local_delta);
        log_delta("remote", &remote_delta);

        if !self.context.force {
            self.check_safety_guard("local", local_deleted, local_prior.len())?;
            self.check_safety_guard("remote", remote_deleted, remote_prior.len())?;
        }

        let mut planned = actions::plan_remote_pass(&remote_delta, &local_delta, &local_now);
        planned.extend(actions::plan_rescue_pass(&local_delta, &remote_delta, &remote_now));

        let mut outcome = RunOutcome::default();
        for action in &planned {
            self.apply_action(action, &mut outcome)?;
        }

        self.driver
            .sync_tree(&self.context.local_root, &self.context.remote_root, excludes, self.context.dry_run)
            .map_err(|e| EngineSeverity::Critical(format!("local-to-remote tree sync failed: {e}")))?;

        self.driver
            .remove_empty_dirs(&self.context.local_root, self.context.dry_run)
            .map_err(|e| EngineSeverity::Critical(format!("removing empty local directories: {e}")))?;
        self.driver
            .remove_empty_dirs(&self.context.remote_root, self.context.dry_run)
            .map_err(|e| EngineSeverity::Critical(format!("removing empty remote directories: {e}")))?;

        let local_final = store
            .produce_current(Side::Local, self.driver.as_ref(), &self.context.local_root, excludes)
            .map_err(|e| EngineSeverity::Critical(format!("re-listing local root: {e}")))?;
        let remote_final = store
            .produce_current(Side::Remote, self.driver.as_ref(), &self.context.remote_root, excludes)
            .map_err(|e| EngineSeverity::Critical(format!("re-listing remote root: {e}")))?;

        store
            .commit(Side::Local, &local_final)
            .map_err(|e| EngineSeverity::Critical(format!("committing local snapshot: {e}")))?;
        store
            .commit(Side::Remote, &remote_final)
            .map_err(|e| EngineSeverity::Critical(format!("committing remote snapshot: {e}")))?;
        store
            .cleanup_transients()
            .map_err(|e| EngineSeverity::Critical(format!("cleaning up transient listings: {e}")))?;

        Ok(outcome)
    }

    fn check_safety_guard(&self, side: &str, deleted: usize, prior_len: usize) -> Result<(), EngineSeverity> {
        if prior_len == 0 {
            return Ok(());
        }
        let fraction = deleted as f64 / prior_len as f64;
        if fraction > self.context.max_delta {
            return Err(EngineSeverity::Abort(format!(
                "excess deletion on {side}: {deleted}/{prior_len} ({:.1}%) exceeds --max-delta {:.1}%; rerun with --force to override",
                fraction * 100.0,
                self.context.max_delta * 100.0
            )));
        }
        Ok(())
    }

    fn apply_action(&self, action: &PlannedAction, outcome: &mut RunOutcome) -> Result<(), EngineSeverity> {
        match action {
            PlannedAction::CopyRemoteToLocal { path, force } => {
                let src = format!("{}/{}", self.context.remote_root, path);
                let dst = format!("{}/{}", self.context.local_root, path);
                log::info!("copy remote -> local: {path}{}", if *force { " (forced)" } else { "" });
                self.driver
                    .copy(&src, &dst, *force, self.context.dry_run)
                    .map_err(|e| EngineSeverity::Critical(format!("copy failed for {path}: {e}")))?;
                outcome.copied_to_local += 1;
            }
            PlannedAction::ConflictNew { path } | PlannedAction::ConflictChanged { path } => {
                let force = matches!(action, PlannedAction::ConflictChanged { .. });
                log::warn!("conflict on {path}: materializing _LOCAL/_REMOTE artifacts");

                let remote_src = format!("{}/{}", self.context.remote_root, path);
                let remote_dst = format!("{}/{}_REMOTE", self.context.local_root, path);
                self.driver
                    .copy(&remote_src, &remote_dst, force, self.context.dry_run)
                    .map_err(|e| EngineSeverity::Critical(format!("conflict copy failed for {path}: {e}")))?;

                let local_src = format!("{}/{}", self.context.local_root, path);
                let local_dst = format!("{}/{}_LOCAL", self.context.local_root, path);
                self.driver
                    .mv(&local_src, &local_dst, self.context.dry_run)
                    .map_err(|e| EngineSeverity::Critical(format!("conflict rename failed for {path}: {e}")))?;

                outcome.conflicts += 1;
            }
            PlannedAction::DeleteLocal { path } => {
                let target = format!("{}/{}", self.context.local_root, path);
                log::info!("delete local: {path}");
                self.driver
                    .delete(&target, self.context.dry_run)
                    .map_err(|e| EngineSeverity::Critical(format!("delete failed for {path}: {e}")))?;
                outcome.deleted_local += 1;
            }
        }
        Ok(())
    }
}

fn log_delta(side: &str, delta: &Delta) {
    for (path, flags) in delta {
        let kind = if flags.new {
            "new"
        } else if flags.deleted {
            "deleted"
        } else if flags.newer {
            "newer"
        } else if flags.older {
            "older"
        } else {
            "size"
        };
        log::info!("{side} delta: {path} [{kind}]");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entry::Entry;
    use crate::testing::fake_fs::FakeFileSystem;
    use crate::testing::fake_transfer::FakeTransferDriver;

    fn context(workdir: &str) -> RunContext {
        RunContext {
            workdir: PathBuf::from(workdir),
            remote_name: "r".into(),
            local_root: "/local".into(),
            remote_root: "/remote".into(),
            first_sync: false,
            check_access: false,
            force: false,
            dry_run: false,
            max_delta: 0.5,
            exclude_list_file: None,
        }
    }

    fn seed_snapshot(fs: &FakeFileSystem, workdir: &str, entries: &[(&str, u64, i64)]) {
        let mut listing = Listing::new();
        for (path, size, mtime) in entries {
            listing.insert(Entry::new(*path, *size, *mtime));
        }
        let store = SnapshotStore::new(fs, std::path::Path::new(workdir), "r", false);
        store.commit(Side::Local, &listing).unwrap();
        store.commit(Side::Remote, &listing).unwrap();
    }

    #[test]
    fn refuses_without_snapshot_unless_first_sync() {
        let fs = FakeFileSystem::new();
        let driver = FakeTransferDriver::new();
        driver.with_root("/local", vec![]);
        driver.with_root("/remote", vec![]);
        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(driver));
        let err = engine.run().unwrap_err();
        assert!(matches!(err, EngineSeverity::Abort(_)));
    }

    #[test]
    fn empty_run_is_a_single_noop_tree_sync() {
        let fs = FakeFileSystem::new();
        seed_snapshot(&fs, "/work", &[("a", 10, 1), ("b", 20, 2)]);
        let driver = FakeTransferDriver::new();
        driver.with_root("/local", vec![Entry::new("a", 10, 1), Entry::new("b", 20, 2)]);
        driver.with_root("/remote", vec![Entry::new("a", 10, 1), Entry::new("b", 20, 2)]);

        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(driver));
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.copied_to_local, 0);
        assert_eq!(outcome.deleted_local, 0);
        assert_eq!(outcome.conflicts, 0);
    }

    #[test]
    fn one_sided_new_file_propagates_via_tree_sync() {
        let fs = FakeFileSystem::new();
        seed_snapshot(&fs, "/work", &[("a", 10, 1)]);
        let driver = FakeTransferDriver::new();
        driver.with_root("/local", vec![Entry::new("a", 10, 1), Entry::new("c", 5, 3)]);
        driver.with_root("/remote", vec![Entry::new("a", 10, 1)]);

        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(driver));
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.copied_to_local, 0);
    }

    #[test]
    fn remote_delete_with_local_unchanged_deletes_local() {
        let fs = FakeFileSystem::new();
        seed_snapshot(&fs, "/work", &[("d", 1, 1), ("e", 3, 6), ("f", 1, 1)]);
        let driver = Arc::new(FakeTransferDriver::new());
        driver.with_root(
            "/local",
            vec![Entry::new("d", 1, 1), Entry::new("e", 3, 6), Entry::new("f", 1, 1)],
        );
        driver.with_root("/remote", vec![Entry::new("d", 1, 1), Entry::new("f", 1, 1)]);

        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(Arc::clone(&driver)));
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.deleted_local, 1);
        assert!(driver.calls().iter().any(|c| c.starts_with("delete /local/e")));
    }

    #[test]
    fn excess_deletion_guard_aborts_without_force() {
        let fs = FakeFileSystem::new();
        let mut prior = Listing::new();
        for i in 0..10 {
            prior.insert(Entry::new(format!("f{i}"), 1, 1));
        }
        let store = SnapshotStore::new(&fs, std::path::Path::new("/work"), "r", false);
        store.commit(Side::Local, &prior).unwrap();
        store.commit(Side::Remote, &prior).unwrap();
        let driver = FakeTransferDriver::new();
        let remaining: Vec<Entry> = (0..4).map(|i| Entry::new(format!("f{i}"), 1, 1)).collect();
        driver.with_root("/local", remaining);
        driver.with_root(
            "/remote",
            (0..10).map(|i| Entry::new(format!("f{i}"), 1, 1)).collect(),
        );

        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(driver));
        let err = engine.run().unwrap_err();
        assert!(matches!(err, EngineSeverity::Abort(_)));
    }

    #[test]
    fn conflict_both_new_materializes_local_and_remote_artifacts() {
        let fs = FakeFileSystem::new();
        seed_snapshot(&fs, "/work", &[("a", 1, 1), ("b", 1, 1), ("c", 1, 1)]);
        let driver = Arc::new(FakeTransferDriver::new());
        driver.with_root(
            "/local",
            vec![Entry::new("a", 1, 1), Entry::new("b", 1, 1), Entry::new("c", 1, 1), Entry::new("d", 7, 4)],
        );
        driver.with_root(
            "/remote",
            vec![Entry::new("a", 1, 1), Entry::new("b", 1, 1), Entry::new("c", 1, 1), Entry::new("d", 8, 5)],
        );

        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(Arc::clone(&driver)));
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.conflicts, 1);

        let local_final = driver.listing_of("/local");
        assert!(!local_final.contains("d"));
        assert!(local_final.contains("d_LOCAL"));
        assert!(local_final.contains("d_REMOTE"));
    }

    #[test]
    fn remote_delete_with_local_changed_keeps_local_and_propagates() {
        let fs = FakeFileSystem::new();
        seed_snapshot(&fs, "/work", &[("d", 1, 1), ("e", 1, 1), ("f", 3, 7)]);
        let driver = Arc::new(FakeTransferDriver::new());
        driver.with_root(
            "/local",
            vec![Entry::new("d", 1, 1), Entry::new("e", 1, 1), Entry::new("f", 4, 8)],
        );
        driver.with_root("/remote", vec![Entry::new("d", 1, 1), Entry::new("e", 1, 1)]);

        let engine = Engine::new(context("/work"), Box::new(fs), Box::new(Arc::clone(&driver)));
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.deleted_local, 0);
        assert!(!driver.calls().iter().any(|c| c.starts_with("delete")));
        assert!(driver.listing_of("/local").contains("f"));
    }

    #[test]
    fn identical_inputs_produce_identical_call_sequences() {
        let run_once = || {
            let fs = FakeFileSystem::new();
            seed_snapshot(&fs, "/work", &[("a", 1, 1)]);
            let driver = Arc::new(FakeTransferDriver::new());
            driver.with_root("/local", vec![Entry::new("a", 1, 1), Entry::new("b", 2, 2)]);
            driver.with_root("/remote", vec![Entry::new("a", 1, 1)]);
            let engine = Engine::new(context("/work"), Box::new(fs), Box::new(Arc::clone(&driver)));
            engine.run().unwrap();
            driver.calls()
        };

        assert_eq!(run_once(), run_once());
    }

    #[test]
    fn missing_exclude_list_file_aborts_before_any_listing() {
        let fs = FakeFileSystem::new();
        seed_snapshot(&fs, "/work", &[("a", 10, 1)]);
        let driver = FakeTransferDriver::new();
        driver.with_root("/local", vec![Entry::new("a", 10, 1)]);
        driver.with_root("/remote", vec![Entry::new("a", 10, 1)]);

        let mut ctx = context("/work");
        ctx.exclude_list_file = Some(PathBuf::from("/work/excludes.txt"));
        let engine = Engine::new(ctx, Box::new(fs), Box::new(driver));
        let err = engine.run().unwrap_err();
        assert!(matches!(err, EngineSeverity::Abort(_)));
    }

    #[test]
    fn second_identical_run_is_idempotent_and_snapshot_bytes_match() {
        let fs = Arc::new(FakeFileSystem::new());
        seed_snapshot(&fs, "/work", &[("a", 10, 1), ("b", 20, 2)]);
        let driver = Arc::new(FakeTransferDriver::new());
        driver.with_root("/local", vec![Entry::new("a", 10, 1), Entry::new("b", 20, 2)]);
        driver.with_root("/remote", vec![Entry::new("a", 10, 1), Entry::new("b", 20, 2)]);

        let run = || {
            let engine = Engine::new(context("/work"), Box::new(Arc::clone(&fs)), Box::new(Arc::clone(&driver)));
            engine.run().unwrap()
        };

        let first = run();
        assert_eq!(first.copied_to_local, 0);
        assert_eq!(first.deleted_local, 0);
        assert_eq!(first.conflicts, 0);

        let paths = crate::snapshot::SnapshotPaths::new(std::path::Path::new("/work"), "r");
        let local_snapshot_after_first = fs.read_to_string(&paths.local).unwrap();
        let remote_snapshot_after_first = fs.read_to_string(&paths.remote).unwrap();

        let second = run();
        assert_eq!(second, RunOutcome::default());

        assert_eq!(fs.read_to_string(&paths.local).unwrap(), local_snapshot_after_first);
        assert_eq!(fs.read_to_string(&paths.remote).unwrap(), remote_snapshot_after_first);
    }

    #[test]
    fn first_sync_copies_remote_unique_files_and_seeds_snapshots() {
        let fs = FakeFileSystem::new();
        let driver = FakeTransferDriver::new();
        driver.with_root("/local", vec![]);
        driver.with_root("/remote", vec![Entry::new("a", 10, 1)]);

        let mut ctx = context("/work");
        ctx.first_sync = true;
        let engine = Engine::new(ctx, Box::new(fs), Box::new(driver));
        let outcome = engine.run().unwrap();
        assert!(outcome.first_sync);
        assert_eq!(outcome.copied_to_local, 1);
    }
}
