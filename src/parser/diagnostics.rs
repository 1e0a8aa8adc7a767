use crate::domain::{Diagnostic, PlanRow};

/// Result of parsing one workbook: rows (including `error`-status rows, kept
/// for the dashboard's row-level view) plus the diagnostics collected along
/// the way.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub rows: Vec<PlanRow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    pub fn valid_rows(&self) -> impl Iterator<Item = &PlanRow> {
        self.rows.iter().filter(|r| r.is_consumable())
    }

    pub fn error_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_consumable()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d.level, crate::domain::DqLevel::Warning))
            .count()
    }
}
