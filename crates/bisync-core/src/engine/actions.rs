use crate::delta::Delta;
use crate::listing::Listing;

/// One unit of work the engine applies during the remote→local pass
/// (spec §4.4 action matrix). Kept as data so the matrix can be unit
/// tested row by row without driving a real (or fake) transfer driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Copy remote `path` onto local `path`. `force` bypasses the
    /// size/time identity check (ignore-times) for in-place updates.
    CopyRemoteToLocal { path: String, force: bool },
    /// Both sides created `path` independently: copy remote to
    /// `path_REMOTE`, rename local `path` to `path_LOCAL`.
    ConflictNew { path: String },
    /// Both sides changed `path` independently: same artifacts as
    /// [`PlannedAction::ConflictNew`], with a forced (ignore-times) copy.
    ConflictChanged { path: String },
    DeleteLocal { path: String },
}

/// Plan the remote→local pass: iterate remote deltas first, deciding an
/// action per path from the remote flag and the local side's state
/// (spec §4.4 table).
///
/// Paths deleted locally are skipped entirely here and left to
/// [`plan_rescue_pass`]: `local_now` never contains a locally-deleted
/// path, so both the `new` and `changed_in_place` branches below would
/// otherwise queue a copy for it unconditionally, duplicating whatever
/// `plan_rescue_pass` queues for the same path.
pub fn plan_remote_pass(
    remote_delta: &Delta,
    local_delta: &Delta,
    local_now: &Listing,
) -> Vec<PlannedAction> {
    let mut actions = Vec::new();

    for (path, flags) in remote_delta {
        if local_delta.get(path).is_some_and(|f| f.deleted) {
            continue;
        }

        if flags.new {
            if local_now.contains(path) {
                actions.push(PlannedAction::ConflictNew { path: path.clone() });
            } else {
                actions.push(PlannedAction::CopyRemoteToLocal {
                    path: path.clone(),
                    force: false,
                });
            }
        } else if flags.changed_in_place() {
            if local_delta.get(path).is_some() {
                actions.push(PlannedAction::ConflictChanged { path: path.clone() });
            } else {
                actions.push(PlannedAction::CopyRemoteToLocal {
                    path: path.clone(),
                    force: true,
                });
            }
        } else if flags.deleted && local_delta.get(path).is_none() && local_now.contains(path) {
            actions.push(PlannedAction::DeleteLocal { path: path.clone() });
        }
        // flags.deleted && local_delta contains path: local change wins,
        // keep the local copy untouched (spec §4.4, §9 open question 1).
    }

    actions
}

/// Rescue pass over local deltas: a path deleted locally whose remote
/// counterpart was independently (re)created or changed in place, and
/// still exists remotely, is restored from the remote copy. This is the
/// sole place that restores a locally-deleted path — [`plan_remote_pass`]
/// skips every path with a local `deleted` delta precisely so the two
/// passes never both queue a copy for it.
pub fn plan_rescue_pass(
    local_delta: &Delta,
    remote_delta: &Delta,
    remote_now: &Listing,
) -> Vec<PlannedAction> {
    let mut actions = Vec::new();

    for (path, local_flags) in local_delta {
        if !local_flags.deleted {
            continue;
        }
        let Some(remote_flags) = remote_delta.get(path) else {
            continue;
        };
        if !remote_now.contains(path) {
            continue;
        }
        if remote_flags.new {
            actions.push(PlannedAction::CopyRemoteToLocal {
                path: path.clone(),
                force: false,
            });
        } else if remote_flags.changed_in_place() {
            actions.push(PlannedAction::CopyRemoteToLocal {
                path: path.clone(),
                force: true,
            });
        }
        // remote_flags.deleted: both sides deleted it, nothing to restore.
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaFlags;
    use crate::entry::Entry;

    fn flags(new: bool, deleted: bool, newer: bool, older: bool, size: bool) -> DeltaFlags {
        DeltaFlags {
            new,
            deleted,
            newer,
            older,
            size,
        }
    }

    #[test]
    fn remote_new_with_no_local_copy_is_plain_copy() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(true, false, false, false, false));
        let local_now = Listing::new();
        let actions = plan_remote_pass(&remote_delta, &Delta::new(), &local_now);
        assert_eq!(
            actions,
            vec![PlannedAction::CopyRemoteToLocal {
                path: "a".into(),
                force: false
            }]
        );
    }

    #[test]
    fn remote_new_with_local_copy_is_conflict() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(true, false, false, false, false));
        let mut local_now = Listing::new();
        local_now.insert(Entry::new("a", 1, 1));
        let actions = plan_remote_pass(&remote_delta, &Delta::new(), &local_now);
        assert_eq!(actions, vec![PlannedAction::ConflictNew { path: "a".into() }]);
    }

    #[test]
    fn remote_newer_untouched_locally_is_forced_copy() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(false, false, true, false, false));
        let local_now = Listing::new();
        let actions = plan_remote_pass(&remote_delta, &Delta::new(), &local_now);
        assert_eq!(
            actions,
            vec![PlannedAction::CopyRemoteToLocal {
                path: "a".into(),
                force: true
            }]
        );
    }

    #[test]
    fn remote_newer_and_local_changed_is_conflict() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(false, false, true, false, false));
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, false, true, false, false));
        let mut local_now = Listing::new();
        local_now.insert(Entry::new("a", 1, 1));
        let actions = plan_remote_pass(&remote_delta, &local_delta, &local_now);
        assert_eq!(
            actions,
            vec![PlannedAction::ConflictChanged { path: "a".into() }]
        );
    }

    #[test]
    fn remote_newer_local_deleted_is_left_to_rescue_pass() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(false, false, true, false, false));
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, true, false, false, false));
        let local_now = Listing::new();
        let actions = plan_remote_pass(&remote_delta, &local_delta, &local_now);
        assert!(actions.is_empty());
    }

    #[test]
    fn remote_deleted_with_no_local_change_deletes_local() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(false, true, false, false, false));
        let mut local_now = Listing::new();
        local_now.insert(Entry::new("a", 1, 1));
        let actions = plan_remote_pass(&remote_delta, &Delta::new(), &local_now);
        assert_eq!(actions, vec![PlannedAction::DeleteLocal { path: "a".into() }]);
    }

    #[test]
    fn remote_deleted_with_local_change_keeps_local() {
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(false, true, false, false, false));
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, false, true, false, false));
        let mut local_now = Listing::new();
        local_now.insert(Entry::new("a", 2, 2));
        let actions = plan_remote_pass(&remote_delta, &local_delta, &local_now);
        assert!(actions.is_empty());
    }

    #[test]
    fn rescue_pass_restores_remote_recreated_file() {
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, true, false, false, false));
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(true, false, false, false, false));
        let mut remote_now = Listing::new();
        remote_now.insert(Entry::new("a", 1, 1));
        let actions = plan_rescue_pass(&local_delta, &remote_delta, &remote_now);
        assert_eq!(
            actions,
            vec![PlannedAction::CopyRemoteToLocal {
                path: "a".into(),
                force: false
            }]
        );
    }

    #[test]
    fn rescue_pass_skips_when_remote_now_missing() {
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, true, false, false, false));
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(true, false, false, false, false));
        let remote_now = Listing::new();
        let actions = plan_rescue_pass(&local_delta, &remote_delta, &remote_now);
        assert!(actions.is_empty());
    }

    #[test]
    fn rescue_pass_restores_remote_changed_in_place_file() {
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, true, false, false, false));
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(false, false, true, false, false));
        let mut remote_now = Listing::new();
        remote_now.insert(Entry::new("a", 1, 1));
        let actions = plan_rescue_pass(&local_delta, &remote_delta, &remote_now);
        assert_eq!(
            actions,
            vec![PlannedAction::CopyRemoteToLocal {
                path: "a".into(),
                force: true
            }]
        );
    }

    #[test]
    fn remote_and_rescue_pass_never_both_act_on_a_locally_deleted_path() {
        let mut local_delta = Delta::new();
        local_delta.insert("a".into(), flags(false, true, false, false, false));
        let mut remote_delta = Delta::new();
        remote_delta.insert("a".into(), flags(true, false, false, false, false));
        let mut remote_now = Listing::new();
        remote_now.insert(Entry::new("a", 1, 1));
        let local_now = Listing::new();

        let mut combined = plan_remote_pass(&remote_delta, &local_delta, &local_now);
        combined.extend(plan_rescue_pass(&local_delta, &remote_delta, &remote_now));

        assert_eq!(
            combined,
            vec![PlannedAction::CopyRemoteToLocal {
                path: "a".into(),
                force: false
            }]
        );
    }
}
