use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Cadence, ConflictType, DqLevel, ValidationStatus};

/// Lifecycle of one uploaded workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportBatchState {
    Uploading,
    Parsing,
    Completed,
    Failed,
}

/// One uploaded workbook and its aggregate parse counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: String,
    pub cadence: Cadence,
    pub file_name: String,
    pub file_size_bytes: u64,
    /// SHA-256 hex digest of the source bytes; used to detect a re-upload of
    /// an unchanged file before it is re-parsed.
    pub content_digest: String,
    pub state: ImportBatchState,
    pub total_rows: u32,
    pub valid_rows: u32,
    pub warning_rows: u32,
    pub error_rows: u32,
    pub uploaded_at: DateTime<Utc>,
}

impl ImportBatch {
    pub fn new(cadence: Cadence, file_name: String, file_size_bytes: u64, content_digest: String) -> Self {
        let id = format!(
            "{}_{}_{:08x}",
            match cadence {
                Cadence::Decade => "dec",
                Cadence::Monthly => "mon",
            },
            Utc::now().format("%Y%m%d_%H%M%S"),
            rand_like_suffix(&content_digest),
        );
        ImportBatch {
            id,
            cadence,
            file_name,
            file_size_bytes,
            content_digest,
            state: ImportBatchState::Uploading,
            total_rows: 0,
            valid_rows: 0,
            warning_rows: 0,
            error_rows: 0,
            uploaded_at: Utc::now(),
        }
    }
}

/// Derives a short, deterministic suffix from the content digest instead of
/// drawing fresh randomness, so batch ids stay reproducible given identical
/// input bytes and upload time.
fn rand_like_suffix(digest: &str) -> u32 {
    let bytes = digest.as_bytes();
    let mut acc: u32 = 0x9e3779b9;
    for b in bytes.iter().take(8) {
        acc = acc.wrapping_mul(31).wrapping_add(*b as u32);
    }
    acc
}

/// One line extracted from a workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRow {
    pub batch_id: String,
    pub row_index: u32,
    pub work_order_id: String,
    pub article_code: String,
    pub package_type: String,
    pub specification: String,
    pub production_unit: String,
    pub feeder_codes: Vec<String>,
    pub maker_codes: Vec<String>,
    pub input_quantity: i64,
    pub final_quantity: i64,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub validation_status: ValidationStatus,
    pub validation_message: Option<String>,
}

impl PlanRow {
    pub fn is_consumable(&self) -> bool {
        !matches!(self.validation_status, ValidationStatus::Error)
    }
}

/// Kind of parser anomaly; carried on every [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Format,
    Missing,
    OutOfRange,
    UnknownCode,
    Structural,
}

/// One parser or pipeline-stage anomaly. Diagnostics are data returned
/// alongside successful output, never raised as [`crate::Error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub row_number: u32,
    pub column_label: String,
    pub kind: DiagnosticKind,
    pub level: DqLevel,
    pub original_value: String,
    pub message: String,
    pub conflict: Option<ConflictType>,
}

impl Diagnostic {
    pub fn error(row_number: u32, column_label: &str, kind: DiagnosticKind, original_value: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            row_number,
            column_label: column_label.to_string(),
            kind,
            level: DqLevel::Error,
            original_value: original_value.to_string(),
            message: message.into(),
            conflict: None,
        }
    }

    pub fn warning(row_number: u32, column_label: &str, kind: DiagnosticKind, original_value: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            row_number,
            column_label: column_label.to_string(),
            kind,
            level: DqLevel::Warning,
            original_value: original_value.to_string(),
            message: message.into(),
            conflict: None,
        }
    }
}
