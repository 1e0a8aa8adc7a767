//! Core domain types shared by the parser, pipeline stages, orchestrator, and
//! persistence layer.

pub mod machine;
pub mod plan_row;
pub mod types;
pub mod work_order;

pub use machine::{Machine, MachineKind, MachineRelation, MaintenanceWindow, ShiftDef, SpeedRule};
pub use plan_row::{Diagnostic, DiagnosticKind, ImportBatch, ImportBatchState, PlanRow};
pub use types::{Cadence, ConflictType, DqLevel, ValidationStatus};
pub use work_order::{OrderKind, TransformStep, WorkOrder, WorkOrderDraft};
