use std::collections::BTreeMap;

use crate::listing::Listing;

/// Change flags for a single path on one side since the prior snapshot.
///
/// `new` and `deleted` are mutually exclusive by construction (a path is
/// only ever classified as one or the other). `newer`/`older` are
/// mutually exclusive with each other but independent of `size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaFlags {
    pub new: bool,
    pub deleted: bool,
    pub newer: bool,
    pub older: bool,
    pub size: bool,
}

impl DeltaFlags {
    pub fn is_empty(&self) -> bool {
        !(self.new || self.deleted || self.newer || self.older || self.size)
    }

    pub fn changed_in_place(&self) -> bool {
        self.newer || self.older || self.size
    }
}

pub type Delta = BTreeMap<String, DeltaFlags>;

/// Compute the set of paths that changed on one side since `prior`,
/// classifying each with [`DeltaFlags`].
///
/// Pure function: no I/O, no logging. The engine logs the result after
/// calling this (spec §4.3: "modulo log output").
pub fn compute(prior: &Listing, now: &Listing) -> (Delta, usize) {
    let mut delta = Delta::new();
    let mut deleted_count = 0usize;

    for (path, prior_entry) in prior.iter() {
        match now.get(path) {
            None => {
                delta.insert(
                    path.clone(),
                    DeltaFlags {
                        deleted: true,
                        ..Default::default()
                    },
                );
                deleted_count += 1;
            }
            Some(now_entry) => {
                let mut flags = DeltaFlags::default();
                if now_entry.mtime_ns > prior_entry.mtime_ns {
                    flags.newer = true;
                } else if now_entry.mtime_ns < prior_entry.mtime_ns {
                    flags.older = true;
                }
                if now_entry.size != prior_entry.size {
                    flags.size = true;
                }
                if !flags.is_empty() {
                    delta.insert(path.clone(), flags);
                }
            }
        }
    }

    for (path, _) in now.iter() {
        if !prior.contains(path) {
            delta.insert(
                path.clone(),
                DeltaFlags {
                    new: true,
                    ..Default::default()
                },
            );
        }
    }

    (delta, deleted_count)
}
