use std::path::{Path, PathBuf};

use crate::error::BisyncError;
use crate::file_system::FileSystem;
use crate::listing::{self, Listing};
use crate::transfer::TransferDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// The conventional working-directory file names for one remote (spec §6).
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub local: PathBuf,
    pub remote: PathBuf,
    pub local_new: PathBuf,
    pub remote_new: PathBuf,
    pub local_chk: PathBuf,
    pub remote_chk: PathBuf,
    pub local_error: PathBuf,
    pub remote_error: PathBuf,
}

impl SnapshotPaths {
    pub fn new(workdir: &Path, remote_name: &str) -> Self {
        let base = |suffix: &str| workdir.join(format!("{remote_name}{suffix}"));
        Self {
            local: base("_localLSL"),
            remote: base("_remoteLSL"),
            local_new: base("_localLSL_new"),
            remote_new: base("_remoteLSL_new"),
            local_chk: base("_localChkLSL"),
            remote_chk: base("_remoteChkLSL"),
            local_error: base("_localLSL_ERROR"),
            remote_error: base("_remoteLSL_ERROR"),
        }
    }

    pub fn for_side(&self, side: Side) -> &Path {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    pub fn new_for_side(&self, side: Side) -> &Path {
        match side {
            Side::Local => &self.local_new,
            Side::Remote => &self.remote_new,
        }
    }

    pub fn chk_for_side(&self, side: Side) -> &Path {
        match side {
            Side::Local => &self.local_chk,
            Side::Remote => &self.remote_chk,
        }
    }

    pub fn error_for_side(&self, side: Side) -> &Path {
        match side {
            Side::Local => &self.local_error,
            Side::Remote => &self.remote_error,
        }
    }
}

/// Manages on-disk snapshot files for one remote: loads/persists the
/// authoritative last-good listings, produces the transient "new"
/// listings for the current run via the Transfer Driver, and quarantines
/// both on critical failure (spec §4.2).
pub struct SnapshotStore<'a> {
    fs: &'a dyn FileSystem,
    paths: SnapshotPaths,
    dry_run: bool,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(fs: &'a dyn FileSystem, workdir: &Path, remote_name: &str, dry_run: bool) -> Self {
        Self {
            fs,
            paths: SnapshotPaths::new(workdir, remote_name),
            dry_run,
        }
    }

    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    fn effective(&self, path: &Path) -> PathBuf {
        if self.dry_run {
            with_suffix(path, "_DRYRUN")
        } else {
            path.to_path_buf()
        }
    }

    /// In dry-run mode, copy the existing authoritative snapshots to their
    /// `_DRYRUN` siblings so the rest of the store's operations can run
    /// against the copies, leaving real state untouched (spec §4.2).
    pub fn prepare_dry_run(&self) -> Result<(), BisyncError> {
        if !self.dry_run {
            return Ok(());
        }
        for side in [Side::Local, Side::Remote] {
            let real = self.paths.for_side(side);
            if self.fs.exists(real) {
                let content = self
                    .fs
                    .read_to_string(real)
                    .map_err(|e| BisyncError::io(real.display().to_string(), to_io_error(e)))?;
                let dry = self.effective(real);
                self.fs
                    .write(&dry, &content)
                    .map_err(|e| BisyncError::io(dry.display().to_string(), to_io_error(e)))?;
            }
        }
        Ok(())
    }

    pub fn exists_for_remote(&self) -> bool {
        self.fs.exists(&self.effective(&self.paths.local))
            && self.fs.exists(&self.effective(&self.paths.remote))
    }

    pub fn load_prior(&self, side: Side) -> Result<Listing, BisyncError> {
        let path = self.effective(self.paths.for_side(side));
        let text = self
            .fs
            .read_to_string(&path)
            .map_err(|e| BisyncError::io(path.display().to_string(), to_io_error(e)))?;
        Ok(listing::parse(&text)?)
    }

    /// Invoke the Transfer Driver's list primitive, persist the raw
    /// listing text to the `_new` transient, and return the parsed
    /// [`Listing`] (spec §4.2, §4.5).
    pub fn produce_current(
        &self,
        side: Side,
        driver: &dyn TransferDriver,
        root: &str,
        excludes: Option<&str>,
    ) -> Result<Listing, BisyncError> {
        let outcome = driver.list(root, excludes, self.dry_run)?;
        let new_path = self.effective(self.paths.new_for_side(side));
        self.fs
            .write(&new_path, &outcome.stdout)
            .map_err(|e| BisyncError::io(new_path.display().to_string(), to_io_error(e)))?;
        Ok(listing::parse(&outcome.stdout)?)
    }

    /// Atomically replace the authoritative snapshot for `side` with
    /// `listing`: write to a temporary sibling, then rename over the
    /// target so a crash mid-write never leaves a partial file (spec §3).
    pub fn commit(&self, side: Side, listing: &Listing) -> Result<(), BisyncError> {
        let target = self.effective(self.paths.for_side(side));
        let tmp = with_suffix(&target, ".tmp");
        let text = listing::render(listing);
        self.fs
            .write(&tmp, &text)
            .map_err(|e| BisyncError::io(tmp.display().to_string(), to_io_error(e)))?;
        self.fs
            .rename(&tmp, &target)
            .map_err(|e| BisyncError::io(target.display().to_string(), to_io_error(e)))?;
        Ok(())
    }

    /// Rename both snapshots to their `_ERROR` siblings so the next run
    /// refuses to proceed without an explicit first-sync (spec §7).
    pub fn quarantine(&self) -> Result<(), BisyncError> {
        for side in [Side::Local, Side::Remote] {
            let src = self.effective(self.paths.for_side(side));
            let dst = self.effective(self.paths.error_for_side(side));
            if self.fs.exists(&src) {
                self.fs
                    .rename(&src, &dst)
                    .map_err(|e| BisyncError::io(src.display().to_string(), to_io_error(e)))?;
            }
        }
        Ok(())
    }

    pub fn cleanup_transients(&self) -> Result<(), BisyncError> {
        for side in [Side::Local, Side::Remote] {
            let path = self.effective(self.paths.new_for_side(side));
            if self.fs.exists(&path) {
                self.fs
                    .remove_file(&path)
                    .map_err(|e| BisyncError::io(path.display().to_string(), to_io_error(e)))?;
            }
        }
        Ok(())
    }
}

fn to_io_error(e: crate::file_system::FsError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}
