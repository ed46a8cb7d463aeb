//! Reconciliation of a declared job set against the live trigger table.

use std::collections::HashSet;

use crate::core::job::ScheduledJob;
use crate::core::types::JobKey;

/// What to change in the trigger table to match a declared job set.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    /// Keys present in the table but absent from the declared set.
    pub to_remove: Vec<JobKey>,
    /// Every declared job. Unchanged keys are re-installed too, since their
    /// expression may have changed.
    pub to_install: Vec<ScheduledJob>,
}

/// Compare `declared` against the keys already scheduled.
///
/// Applying the plan removes first and installs second, so a key is never
/// scheduled twice during the swap.
pub fn reconcile<'a>(
    declared: Vec<ScheduledJob>,
    existing: impl IntoIterator<Item = &'a JobKey>,
) -> ReconcilePlan {
    let declared_keys: HashSet<&JobKey> = declared.iter().map(|job| job.key()).collect();
    let to_remove = existing
        .into_iter()
        .filter(|key| !declared_keys.contains(key))
        .cloned()
        .collect();

    ReconcilePlan {
        to_remove,
        to_install: declared,
    }
}
