use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::domain::{Cadence, Diagnostic, DiagnosticKind, ImportBatch, PlanRow, ValidationStatus};
use crate::error::{Error, Result};

use super::diagnostics::ParseOutcome;
use super::fields::{default_year_for, normalize_article, parse_date_range, parse_quantity, split_machine_codes};

const BLANK_RUN_TERMINATOR: usize = 3;

/// Labels the header scanner looks for, matched case-insensitively against
/// cell text; column position is resolved by label, never by fixed index.
const HEADER_LABELS: &[(&str, &[&str])] = &[
    ("article", &["article", "牌号"]),
    ("feeder", &["feeder", "喂丝机"]),
    ("maker", &["maker", "卷包机"]),
    ("input_quantity", &["input", "投料"]),
    ("final_quantity", &["final", "成品"]),
    ("date_range", &["date", "日期"]),
    ("package_type", &["package", "包装"]),
    ("specification", &["spec", "规格"]),
    ("production_unit", &["unit", "单位"]),
    ("work_order_id", &["order", "工单"]),
];

pub struct WorkbookParser {
    pub cadence: Cadence,
}

impl WorkbookParser {
    pub fn new(cadence: Cadence) -> Self {
        WorkbookParser { cadence }
    }
}

/// Decodes a workbook, locates its header row, and extracts [`PlanRow`]
/// values. Returns the created [`ImportBatch`] (state `Parsing`, not yet
/// persisted) and the parse outcome.
pub fn parse_workbook(path: &Path, cadence: Cadence) -> Result<(ImportBatch, ParseOutcome)> {
    let bytes = std::fs::read(path)?;
    let digest = hex::encode(Sha256::digest(&bytes));
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    info!(file = %file_name, bytes = bytes.len(), "opening workbook");

    let mut batch = ImportBatch::new(cadence, file_name, bytes.len() as u64, digest);

    let mut workbook = open_workbook_auto(path).map_err(Error::from)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::WorkbookUnreadable("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::WorkbookUnreadable(e.to_string()))?;

    let outcome = extract_rows(&range, &batch.id, cadence, batch.uploaded_at)?;

    batch.total_rows = outcome.rows.len() as u32;
    batch.valid_rows = outcome.rows.iter().filter(|r| matches!(r.validation_status, ValidationStatus::Valid)).count() as u32;
    batch.warning_rows = outcome.rows.iter().filter(|r| matches!(r.validation_status, ValidationStatus::Warning)).count() as u32;
    batch.error_rows = outcome.rows.iter().filter(|r| matches!(r.validation_status, ValidationStatus::Error)).count() as u32;

    info!(
        batch_id = %batch.id,
        total = batch.total_rows,
        valid = batch.valid_rows,
        warnings = batch.warning_rows,
        errors = batch.error_rows,
        "workbook parsed"
    );

    Ok((batch, outcome))
}

fn locate_header(range: &Range<Data>) -> Option<(usize, HashMap<&'static str, usize>)> {
    for row_idx in 0..range.height().min(20) {
        let mut found: HashMap<&'static str, usize> = HashMap::new();
        for col_idx in 0..range.width() {
            let cell_text = range
                .get((row_idx, col_idx))
                .map(|c| c.to_string().to_lowercase())
                .unwrap_or_default();
            if cell_text.is_empty() {
                continue;
            }
            for (key, aliases) in HEADER_LABELS {
                if aliases.iter().any(|a| cell_text.contains(a)) {
                    found.entry(key).or_insert(col_idx);
                }
            }
        }
        // require the core identifying columns before accepting this as the header row
        if found.contains_key("article") && found.contains_key("feeder") && found.contains_key("maker") {
            return Some((row_idx, found));
        }
    }
    None
}

fn extract_rows(range: &Range<Data>, batch_id: &str, cadence: Cadence, uploaded_at: chrono::DateTime<Utc>) -> Result<ParseOutcome> {
    let (header_row, columns) = locate_header(range).ok_or_else(|| Error::HeaderNotFound("no row matched the expected column labels".to_string()))?;

    let default_year = default_year_for(cadence, uploaded_at);
    let mut outcome = ParseOutcome::default();
    let mut blank_run = 0usize;

    for row_idx in (header_row + 1)..range.height() {
        let row_number = (row_idx - header_row) as u32;
        let get = |key: &str| -> String {
            columns
                .get(key)
                .and_then(|&c| range.get((row_idx, c)))
                .map(|c| c.to_string().trim().to_string())
                .unwrap_or_default()
        };

        let article_raw = get("article");
        let feeder_raw = get("feeder");
        let maker_raw = get("maker");
        let input_qty_raw = get("input_quantity");
        let date_range_raw = get("date_range");

        if article_raw.is_empty() && feeder_raw.is_empty() && maker_raw.is_empty() && input_qty_raw.is_empty() {
            blank_run += 1;
            if blank_run >= BLANK_RUN_TERMINATOR {
                debug!(row = row_number, "terminating scan after blank-row run");
                break;
            }
            continue;
        }
        blank_run = 0;

        let mut row_diagnostics = Vec::new();
        let mut status = ValidationStatus::Valid;

        let feeder_codes = split_machine_codes(&feeder_raw);
        if feeder_codes.is_empty() {
            row_diagnostics.push(Diagnostic::error(row_number, "feeder", DiagnosticKind::Missing, &feeder_raw, "no feeder code present"));
            status = ValidationStatus::Error;
        }
        let maker_codes = split_machine_codes(&maker_raw);
        if maker_codes.is_empty() {
            row_diagnostics.push(Diagnostic::error(row_number, "maker", DiagnosticKind::Missing, &maker_raw, "no maker code present"));
            status = ValidationStatus::Error;
        }

        let input_quantity = match parse_quantity(&input_qty_raw, row_number, "input_quantity") {
            Ok(q) => q,
            Err(d) => {
                row_diagnostics.push(d);
                status = ValidationStatus::Error;
                0
            }
        };
        let final_qty_raw = get("final_quantity");
        let final_quantity = if final_qty_raw.is_empty() {
            input_quantity
        } else {
            match parse_quantity(&final_qty_raw, row_number, "final_quantity") {
                Ok(q) => q,
                Err(d) => {
                    row_diagnostics.push(d);
                    status = ValidationStatus::Error;
                    input_quantity
                }
            }
        };

        if status != ValidationStatus::Error && input_quantity > 0 {
            let ratio = final_quantity as f64 / input_quantity as f64;
            if !(0.8..=1.2).contains(&ratio) {
                row_diagnostics.push(Diagnostic::warning(
                    row_number,
                    "final_quantity",
                    DiagnosticKind::OutOfRange,
                    &final_qty_raw,
                    format!("final quantity {final_quantity} is outside [0.8, 1.2] of input {input_quantity}"),
                ));
                if status == ValidationStatus::Valid {
                    status = ValidationStatus::Warning;
                }
            }
        }

        let (planned_start, planned_end) = match parse_date_range(&date_range_raw, default_year) {
            Some(range) => range,
            None => {
                row_diagnostics.push(Diagnostic::error(
                    row_number,
                    "date_range",
                    DiagnosticKind::Format,
                    &date_range_raw,
                    "unparseable date range",
                ));
                status = ValidationStatus::Error;
                (uploaded_at, uploaded_at)
            }
        };

        let article_code = normalize_article(&article_raw);
        if article_code.is_empty() {
            row_diagnostics.push(Diagnostic::error(row_number, "article", DiagnosticKind::Missing, &article_raw, "article code missing"));
            status = ValidationStatus::Error;
        }

        let work_order_id = {
            let raw = get("work_order_id");
            if raw.is_empty() {
                format!("{batch_id}-{row_number}")
            } else {
                raw
            }
        };

        let message = row_diagnostics.first().map(|d| d.message.clone());
        outcome.rows.push(PlanRow {
            batch_id: batch_id.to_string(),
            row_index: row_number,
            work_order_id,
            article_code,
            package_type: get("package_type"),
            specification: get("specification"),
            production_unit: get("production_unit"),
            feeder_codes,
            maker_codes,
            input_quantity,
            final_quantity,
            planned_start,
            planned_end,
            validation_status: status,
            validation_message: message,
        });
        outcome.diagnostics.extend(row_diagnostics);
    }

    if outcome.rows.is_empty() {
        warn!(batch_id, "workbook parsed to zero data rows");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_labels_cover_required_columns() {
        let keys: Vec<&str> = HEADER_LABELS.iter().map(|(k, _)| *k).collect();
        for required in ["article", "feeder", "maker", "input_quantity", "date_range"] {
            assert!(keys.contains(&required));
        }
    }
}
