/// A single file record: its path relative to the root of its side, its
/// size in bytes, and its modification time as nanoseconds since the Unix
/// epoch.
///
/// Equality between two entries is never used by the engine; only
/// field-wise comparison of `size` and `mtime` for entries that share the
/// same path matters (see [`crate::delta::compute`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub size: u64,
    pub mtime_ns: i64,
}

impl Entry {
    pub fn new(path: impl Into<String>, size: u64, mtime_ns: i64) -> Self {
        Self {
            path: path.into(),
            size,
            mtime_ns,
        }
    }
}
