//! The five transform stages driven by the orchestrator, in order:
//! merge → split → time-correction → parallel-synchronization → emission.

pub mod emission;
pub mod merge;
pub mod parallel_sync;
pub mod split;
pub mod time_correction;

pub use emission::emit_work_orders;
pub use merge::{draft_from_single, merge_rows};
pub use parallel_sync::synchronize;
pub use split::split_draft;
pub use time_correction::correct_time;

use crate::domain::Diagnostic;

/// Output shared by every pipeline stage: the transformed drafts plus any
/// diagnostics raised while producing them.
#[derive(Debug, Default)]
pub struct StageOutcome<T> {
    pub items: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> StageOutcome<T> {
    pub fn new(items: Vec<T>) -> Self {
        StageOutcome { items, diagnostics: Vec::new() }
    }
}
