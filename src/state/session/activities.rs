use super::SessionState;
use crate::patch::{self, PatchOperation};
use crate::types::Activity;
use tracing::warn;

impl SessionState {
    pub(super) fn snapshot_activity(&mut self, activity: Activity) {
        self.activities.insert(activity.id.clone(), activity);
    }

    /// Patches an already snapshotted activity. The prior activity is kept if
    /// the patch fails or its result is not a valid activity.
    pub(super) fn patch_activity(&mut self, id: &str, ops: &[PatchOperation]) {
        let Some(current) = self.activities.get(id) else {
            warn!(activity_id = id, "activity_delta for unknown activity; dropping");
            return;
        };

        let next = match patch::apply_typed(current, ops) {
            Ok(next) => next,
            Err(err) => {
                warn!(activity_id = id, error = %err, "activity_delta rejected");
                return;
            }
        };
        if next.id != current.id {
            warn!(activity_id = id, patched_id = %next.id, "activity_delta may not change the id");
            return;
        }
        if !next.progress_in_range() {
            warn!(activity_id = id, progress = next.progress, "activity_delta progress out of range");
            return;
        }
        self.activities.insert(id.to_string(), next);
    }
}
