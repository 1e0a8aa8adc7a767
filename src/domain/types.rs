use serde::{Deserialize, Serialize};

/// Planning cadence. Both share the same pipeline contract; §9 of the design
/// notes records why monthly rows need no separate weekly-slicing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cadence {
    Decade,
    Monthly,
}

/// Per-row outcome of parsing and downstream validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Warning,
    Error,
    /// Escalated by a pipeline stage that could not produce a feasible
    /// schedule within its iteration bound.
    ManualReview,
}

/// Import-time conflict classification, mirrored on emitted diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictType {
    PrimaryKeyMissing,
    PrimaryKeyDuplicate,
    ReferenceDataMissing,
    DataTypeError,
}

/// Severity for data-quality diagnostics produced during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DqLevel {
    Error,
    Warning,
    Info,
    Conflict,
}
