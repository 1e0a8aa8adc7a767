//! Tolerant workbook ingestion: decode, locate the header, extract fields,
//! and produce [`crate::domain::PlanRow`] values plus diagnostics.

pub mod diagnostics;
pub mod fields;
pub mod workbook;

pub use diagnostics::ParseOutcome;
pub use workbook::{parse_workbook, WorkbookParser};
