use std::collections::BTreeSet;

use thiserror::Error;

use crate::file_system::FileSystem;
use crate::listing::{self, Listing};
use crate::snapshot::SnapshotPaths;
use crate::transfer::{TransferDriver, TransferError};

pub const SENTINEL_FILE_NAME: &str = "RCLONE_TEST";

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("health check failed to list {side}: {source}")]
    ListFailed {
        side: &'static str,
        #[source]
        source: TransferError,
    },

    #[error("health check found an empty listing on {side}")]
    EmptyListing { side: &'static str },

    #[error(
        "sentinel file paths don't match between sides (local-only: {local_only:?}, remote-only: {remote_only:?})"
    )]
    PathMismatch {
        local_only: Vec<String>,
        remote_only: Vec<String>,
    },
}

fn sentinel_paths(listing: &Listing) -> BTreeSet<String> {
    listing
        .paths()
        .filter(|path| {
            path.rsplit('/')
                .next()
                .map(|name| name == SENTINEL_FILE_NAME)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Sanity check that the sentinel file (spec §6, conventionally named
/// `RCLONE_TEST`) exists on both sides at matching paths before anything
/// is touched (spec §4.4 precondition 3).
pub fn check(
    fs: &dyn FileSystem,
    paths: &SnapshotPaths,
    driver: &dyn TransferDriver,
    local_root: &str,
    remote_root: &str,
    dry_run: bool,
) -> Result<(), HealthError> {
    let local_outcome = driver
        .list(local_root, None, dry_run)
        .map_err(|source| HealthError::ListFailed { side: "local", source })?;
    let _ = fs.write(paths.local_chk.as_path(), &local_outcome.stdout);

    let remote_outcome = driver
        .list(remote_root, None, dry_run)
        .map_err(|source| HealthError::ListFailed { side: "remote", source })?;
    let _ = fs.write(paths.remote_chk.as_path(), &remote_outcome.stdout);

    let local_listing = listing::parse(&local_outcome.stdout).unwrap_or_default();
    let remote_listing = listing::parse(&remote_outcome.stdout).unwrap_or_default();

    if local_listing.is_empty() {
        return Err(HealthError::EmptyListing { side: "local" });
    }
    if remote_listing.is_empty() {
        return Err(HealthError::EmptyListing { side: "remote" });
    }

    let local_sentinels = sentinel_paths(&local_listing);
    let remote_sentinels = sentinel_paths(&remote_listing);

    let local_only: Vec<String> = local_sentinels.difference(&remote_sentinels).cloned().collect();
    let remote_only: Vec<String> = remote_sentinels.difference(&local_sentinels).cloned().collect();

    if !local_only.is_empty() || !remote_only.is_empty() || local_sentinels.is_empty() {
        return Err(HealthError::PathMismatch {
            local_only,
            remote_only,
        });
    }

    Ok(())
}
