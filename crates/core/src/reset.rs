//! Per-block clearing shared by the controller and the stores.

use crate::gate::ResetScope;
use crate::model::{BlockId, ProgressState};

impl ProgressState {
    /// Clears the data owned by one block and drops it from the completed set.
    ///
    /// Only the fields named by `scope` are touched. The step pointer and the
    /// revision are left to the caller.
    pub fn clear_block(&mut self, block_id: BlockId, scope: ResetScope) {
        match scope {
            ResetScope::RoleQuiz => self.set_role(None),
            ResetScope::DiagnosticTable => self.clear_table(),
            ResetScope::SequentialForm => self.clear_form(),
        }
        self.unmark_completed(block_id);
    }
}
