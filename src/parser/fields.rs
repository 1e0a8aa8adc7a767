use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{Cadence, Diagnostic, DiagnosticKind};

static CODE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,，;\s]+").unwrap());
static DATE_RANGE_FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})/(\d{1,2})/(\d{1,2})\s*-\s*(\d{4})/(\d{1,2})/(\d{1,2})").unwrap());
static DATE_RANGE_SHORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\s*-\s*(\d{1,2})\.(\d{1,2})").unwrap());

/// Splits a machine-code cell (feeder or maker list) on any of comma,
/// ideographic comma, semicolon, or whitespace; trims, deduplicates
/// preserving order, and drops empty tokens.
pub fn split_machine_codes(cell: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    CODE_SPLIT
        .split(cell.trim())
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Parses a date-range cell of either `YYYY/MM/DD - YYYY/MM/DD` or the
/// abbreviated `M.D - M.D` form. Missing year defaults to `default_year`;
/// the result spans 00:00:00 on the start date to 23:59:59 on the end date.
pub fn parse_date_range(cell: &str, default_year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if let Some(caps) = DATE_RANGE_FULL.captures(cell) {
        let sy: i32 = caps[1].parse().ok()?;
        let sm: u32 = caps[2].parse().ok()?;
        let sd: u32 = caps[3].parse().ok()?;
        let ey: i32 = caps[4].parse().ok()?;
        let em: u32 = caps[5].parse().ok()?;
        let ed: u32 = caps[6].parse().ok()?;
        return build_range(sy, sm, sd, ey, em, ed);
    }
    if let Some(caps) = DATE_RANGE_SHORT.captures(cell) {
        let sm: u32 = caps[1].parse().ok()?;
        let sd: u32 = caps[2].parse().ok()?;
        let em: u32 = caps[3].parse().ok()?;
        let ed: u32 = caps[4].parse().ok()?;
        return build_range(default_year, sm, sd, default_year, em, ed);
    }
    None
}

fn build_range(sy: i32, sm: u32, sd: u32, ey: i32, em: u32, ed: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start_date = NaiveDate::from_ymd_opt(sy, sm, sd)?;
    let end_date = NaiveDate::from_ymd_opt(ey, em, ed)?;
    let start = Utc.from_utc_datetime(&start_date.and_hms_opt(0, 0, 0)?);
    let end = Utc.from_utc_datetime(&end_date.and_hms_opt(23, 59, 59)?);
    Some((start, end))
}

/// Validates and parses a quantity cell; returns a row-level diagnostic on
/// failure instead of raising, per the parser's error-as-data contract.
pub fn parse_quantity(cell: &str, row_number: u32, column_label: &str) -> Result<i64, Diagnostic> {
    let cleaned = cell.trim().replace(',', "");
    cleaned.parse::<i64>().map_err(|_| {
        Diagnostic::error(
            row_number,
            column_label,
            DiagnosticKind::Format,
            cell,
            format!("'{cell}' is not a valid integer quantity"),
        )
    })
}

/// Whitespace-collapses and upper-cases an article code into canonical form.
pub fn normalize_article(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Picks the default year used when a date-range cell omits one. Both
/// cadences default to the upload year; the decade cadence additionally
/// assumes the *next* decade period when the short date form would otherwise
/// resolve to a date already in the past relative to upload time, which the
/// caller applies by bumping `default_year` before calling this function.
pub fn default_year_for(_cadence: Cadence, batch_upload_time: DateTime<Utc>) -> i32 {
    batch_upload_time.year()
}
