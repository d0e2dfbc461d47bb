use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::entry::Entry;
use crate::listing::{self, Listing};
use crate::transfer::{TransferDriver, TransferError, TransferOutcome};

/// In-memory [`TransferDriver`] fake for engine tests, grounded on the
/// teacher's `tests::test_rsync_client`. Tracks each registered root's
/// contents as a map of relative path to [`Entry`] and records every call
/// made against it, so tests can assert both the resulting tree state and
/// the exact, deterministic sequence of driver calls (spec §8).
#[derive(Default)]
pub struct FakeTransferDriver {
    roots: Mutex<BTreeMap<String, BTreeMap<String, Entry>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransferDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(&self, root: &str, entries: Vec<Entry>) {
        let mut contents = BTreeMap::new();
        for entry in entries {
            contents.insert(entry.path.clone(), entry);
        }
        self.roots.lock().unwrap().insert(root.to_string(), contents);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn listing_of(&self, root: &str) -> Listing {
        self.roots
            .lock()
            .unwrap()
            .get(root)
            .cloned()
            .unwrap_or_default()
            .into_values()
            .collect()
    }

    fn resolve<'a>(&self, roots: &'a BTreeMap<String, BTreeMap<String, Entry>>, full_path: &str) -> Option<(&'a str, String)> {
        roots
            .keys()
            .filter(|root| full_path == root.as_str() || full_path.starts_with(&format!("{root}/")))
            .max_by_key(|root| root.len())
            .map(|root| {
                let rel = full_path
                    .strip_prefix(root.as_str())
                    .unwrap_or("")
                    .trim_start_matches('/')
                    .to_string();
                (root.as_str(), rel)
            })
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl TransferDriver for FakeTransferDriver {
    fn list(
        &self,
        root: &str,
        _excludes: Option<&str>,
        _dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        self.record(format!("list {root}"));
        let listing = self.listing_of(root);
        Ok(TransferOutcome {
            exit_code: 0,
            stdout: listing::render(&listing),
            command: format!("fake lsl {root}"),
        })
    }

    fn copy(
        &self,
        src: &str,
        dst: &str,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        self.record(format!(
            "copy {src} -> {dst}{}",
            if force_overwrite { " (force)" } else { "" }
        ));
        if !dry_run {
            let mut roots = self.roots.lock().unwrap();
            let (src_root, src_rel) = self
                .resolve(&roots, src)
                .ok_or_else(|| TransferError::Io(format!("unknown src root for {src}")))?;
            let src_root = src_root.to_string();
            let entry = roots
                .get(&src_root)
                .and_then(|c| c.get(&src_rel))
                .cloned()
                .ok_or_else(|| TransferError::Io(format!("source path not found: {src}")))?;
            let (dst_root, dst_rel) = self
                .resolve(&roots, dst)
                .ok_or_else(|| TransferError::Io(format!("unknown dst root for {dst}")))?;
            let dst_root = dst_root.to_string();
            roots
                .entry(dst_root)
                .or_default()
                .insert(dst_rel.clone(), Entry::new(dst_rel, entry.size, entry.mtime_ns));
        }
        Ok(TransferOutcome {
            exit_code: 0,
            stdout: String::new(),
            command: format!("fake copy {src} {dst}"),
        })
    }

    fn mv(&self, src: &str, dst: &str, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        self.record(format!("move {src} -> {dst}"));
        if !dry_run {
            let mut roots = self.roots.lock().unwrap();
            let (src_root, src_rel) = self
                .resolve(&roots, src)
                .ok_or_else(|| TransferError::Io(format!("unknown src root for {src}")))?;
            let src_root = src_root.to_string();
            let entry = roots
                .get_mut(&src_root)
                .and_then(|c| c.remove(&src_rel))
                .ok_or_else(|| TransferError::Io(format!("source path not found: {src}")))?;
            let (dst_root, dst_rel) = self
                .resolve(&roots, dst)
                .ok_or_else(|| TransferError::Io(format!("unknown dst root for {dst}")))?;
            let dst_root = dst_root.to_string();
            roots
                .entry(dst_root)
                .or_default()
                .insert(dst_rel.clone(), Entry::new(dst_rel, entry.size, entry.mtime_ns));
        }
        Ok(TransferOutcome {
            exit_code: 0,
            stdout: String::new(),
            command: format!("fake move {src} {dst}"),
        })
    }

    fn delete(&self, path: &str, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        self.record(format!("delete {path}"));
        if !dry_run {
            let mut roots = self.roots.lock().unwrap();
            let (root, rel) = self
                .resolve(&roots, path)
                .ok_or_else(|| TransferError::Io(format!("unknown root for {path}")))?;
            let root = root.to_string();
            roots.entry(root).or_default().remove(&rel);
        }
        Ok(TransferOutcome {
            exit_code: 0,
            stdout: String::new(),
            command: format!("fake delete {path}"),
        })
    }

    fn sync_tree(
        &self,
        src: &str,
        dst: &str,
        _excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        self.record(format!("sync {src} -> {dst}"));
        if !dry_run {
            let mut roots = self.roots.lock().unwrap();
            let src_contents = roots.get(src).cloned().unwrap_or_default();
            roots.insert(dst.to_string(), src_contents);
        }
        Ok(TransferOutcome {
            exit_code: 0,
            stdout: String::new(),
            command: format!("fake sync {src} {dst}"),
        })
    }

    fn remove_empty_dirs(
        &self,
        root: &str,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        self.record(format!("rmdirs {root}"));
        let _ = dry_run;
        Ok(TransferOutcome {
            exit_code: 0,
            stdout: String::new(),
            command: format!("fake rmdirs {root}"),
        })
    }
}
