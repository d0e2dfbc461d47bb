use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::Arc;

use thiserror::Error;

/// Result of a single transfer-driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub exit_code: i32,
    /// Captured stdout — only meaningful for [`TransferDriver::list`];
    /// other primitives don't parse output beyond exit status (spec §4.5).
    pub stdout: String,
    pub command: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer process failed (exit code {exit_code:?}): {message}")]
    ProcessFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("transfer binary not found on PATH")]
    BinaryNotFound,

    #[error("I/O error launching transfer process: {0}")]
    Io(String),
}

/// Thin adapter over the external transfer utility (spec §4.5).
///
/// The driver does not parse the utility's output beyond exit status; it
/// captures output only for [`TransferDriver::list`]. Every primitive
/// accepts a `dry_run` flag forwarded to the utility.
pub trait TransferDriver: Send + Sync {
    fn list(
        &self,
        root: &str,
        excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError>;

    fn copy(
        &self,
        src: &str,
        dst: &str,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError>;

    fn mv(&self, src: &str, dst: &str, dry_run: bool) -> Result<TransferOutcome, TransferError>;

    fn delete(&self, path: &str, dry_run: bool) -> Result<TransferOutcome, TransferError>;

    fn sync_tree(
        &self,
        src: &str,
        dst: &str,
        excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError>;

    fn remove_empty_dirs(&self, root: &str, dry_run: bool)
        -> Result<TransferOutcome, TransferError>;
}

/// Lets a shared, reference-counted driver (e.g. a test fake a test keeps
/// its own handle to) be boxed into an `Engine` while the caller retains
/// a handle to inspect recorded calls afterward.
impl<T: TransferDriver + ?Sized> TransferDriver for Arc<T> {
    fn list(
        &self,
        root: &str,
        excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        (**self).list(root, excludes, dry_run)
    }

    fn copy(
        &self,
        src: &str,
        dst: &str,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        (**self).copy(src, dst, force_overwrite, dry_run)
    }

    fn mv(&self, src: &str, dst: &str, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        (**self).mv(src, dst, dry_run)
    }

    fn delete(&self, path: &str, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        (**self).delete(path, dry_run)
    }

    fn sync_tree(
        &self,
        src: &str,
        dst: &str,
        excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        (**self).sync_tree(src, dst, excludes, dry_run)
    }

    fn remove_empty_dirs(
        &self,
        root: &str,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        (**self).remove_empty_dirs(root, dry_run)
    }
}

/// Production [`TransferDriver`] shelling out to a configurable binary
/// (default `rclone`). Grounded on the teacher's
/// `ProcessRsyncClient::execute`: spawn with piped stdout/stderr,
/// line-buffer both streams, map the exit status to a typed error.
pub struct ProcessTransferDriver {
    binary: String,
}

impl ProcessTransferDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<TransferOutcome, TransferError> {
        let command_str = format!("{} {}", self.binary, args.join(" "));
        log::debug!("running transfer command: {command_str}");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TransferError::BinaryNotFound
                } else {
                    TransferError::Io(e.to_string())
                }
            })?;

        let mut stdout_lines = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                stdout_lines.push(line.map_err(|e| TransferError::Io(e.to_string()))?);
            }
        }

        let stderr_output = if let Some(stderr) = child.stderr.take() {
            BufReader::new(stderr)
                .lines()
                .filter_map(|l| l.ok())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            String::new()
        };

        let status = child.wait().map_err(|e| TransferError::Io(e.to_string()))?;
        let exit_code = status.code().unwrap_or(-1);

        if exit_code != 0 {
            return Err(TransferError::ProcessFailed {
                message: stderr_output,
                exit_code: Some(exit_code),
            });
        }

        Ok(TransferOutcome {
            exit_code,
            stdout: stdout_lines.join("\n"),
            command: command_str,
        })
    }

    fn with_dry_run(args: &mut Vec<String>, dry_run: bool) {
        if dry_run && !args.iter().any(|a| a == "--dry-run") {
            args.push("--dry-run".to_string());
        }
    }

    fn with_excludes(args: &mut Vec<String>, excludes: Option<&str>) {
        if let Some(path) = excludes {
            args.push("--exclude-from".to_string());
            args.push(path.to_string());
        }
    }
}

impl TransferDriver for ProcessTransferDriver {
    fn list(
        &self,
        root: &str,
        excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let mut args = vec!["lsl".to_string(), root.to_string()];
        Self::with_excludes(&mut args, excludes);
        Self::with_dry_run(&mut args, dry_run);
        self.run(&args)
    }

    fn copy(
        &self,
        src: &str,
        dst: &str,
        force_overwrite: bool,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let mut args = vec!["copyto".to_string(), src.to_string(), dst.to_string()];
        if force_overwrite {
            args.push("--ignore-times".to_string());
        }
        Self::with_dry_run(&mut args, dry_run);
        self.run(&args)
    }

    fn mv(&self, src: &str, dst: &str, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        let mut args = vec!["moveto".to_string(), src.to_string(), dst.to_string()];
        Self::with_dry_run(&mut args, dry_run);
        self.run(&args)
    }

    fn delete(&self, path: &str, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        let mut args = vec!["deletefile".to_string(), path.to_string()];
        Self::with_dry_run(&mut args, dry_run);
        self.run(&args)
    }

    fn sync_tree(
        &self,
        src: &str,
        dst: &str,
        excludes: Option<&str>,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let mut args = vec!["sync".to_string(), src.to_string(), dst.to_string()];
        Self::with_excludes(&mut args, excludes);
        Self::with_dry_run(&mut args, dry_run);
        self.run(&args)
    }

    fn remove_empty_dirs(
        &self,
        root: &str,
        dry_run: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let mut args = vec!["rmdirs".to_string(), root.to_string()];
        Self::with_dry_run(&mut args, dry_run);
        self.run(&args)
    }
}
