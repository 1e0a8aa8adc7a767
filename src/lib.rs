//! Production-plan scheduling engine: tolerant workbook ingestion feeding a
//! five-stage transform pipeline (merge, split, time-correction,
//! parallel-synchronization, emission), an orchestrator driving tasks over
//! that pipeline, and the persistence and MES-dispatch surfaces around it.

pub mod config;
pub mod domain;
pub mod error;
pub mod mes;
pub mod orchestrator;
pub mod parser;
pub mod persistence;
pub mod pipeline;
pub mod reference_data;
pub mod sequence;

pub use error::{Error, Result};

pub use domain::{
    Cadence, ConflictType, Diagnostic, DiagnosticKind, DqLevel, ImportBatch, ImportBatchState, Machine, MachineKind, MachineRelation,
    MaintenanceWindow, OrderKind, PlanRow, ShiftDef, SpeedRule, TransformStep, ValidationStatus, WorkOrder, WorkOrderDraft,
};

pub use parser::{parse_workbook, ParseOutcome, WorkbookParser};

pub use pipeline::{correct_time, draft_from_single, emit_work_orders, merge_rows, split_draft, synchronize, StageOutcome};

pub use reference_data::{CalendarService, MachineRelationService, MaintenanceService, ReferenceData, ReferenceSnapshot, SpeedService};

pub use sequence::IdAllocator;

pub use orchestrator::{progress_through, Orchestrator, StageOptions, TaskState, TaskStatus, CANCELLATION_CHUNK_SIZE, STAGE_WEIGHTS};

pub use persistence::{SqliteStore, TaskRow};

pub use mes::{dispatch_record_for, DispatchRecord, DispatchResponse, DispatchResult, InputBatch, MesDispatcher, MesTransport, MAX_DISPATCH_ATTEMPTS};

pub use config::AppConfig;

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Returns the crate version as a semantic version string.
pub fn version() -> String {
    format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_matches_constants() {
        assert_eq!(version(), "0.1.0");
    }
}
