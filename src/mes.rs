//! MES dispatch records and outbound delivery, per §6 and §9 open question
//! (b). The wire transport itself (HTTP/RPC bytes) is out of scope; this
//! module owns the record shape, the mapping from a [`WorkOrder`], and the
//! retry policy around a caller-supplied [`MesTransport`].

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::WorkOrder;
use crate::error::{Error, Result};

/// Maximum dispatch attempts before a record is abandoned (§6: "max 3
/// attempts").
pub const MAX_DISPATCH_ATTEMPTS: u32 = 3;

fn format_plan_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y/%m/%d %H:%M:%S").to_string()
}

fn format_plan_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// One upstream material reference attached to a [`DispatchRecord`]: a
/// feeder entry for a maker order, or an upstream-material entry for a
/// feeder order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputBatch {
    pub input_plan_id: String,
    pub material_code: String,
    #[serde(default = "default_true")]
    pub is_main_channel: bool,
    pub is_last_one: Option<bool>,
    #[serde(default)]
    pub is_deleted: bool,
}

fn default_true() -> bool {
    true
}

/// The hierarchical record handed to the MES, per §6. `plan_id` reuses the
/// work-order id assigned by [`crate::sequence::IdAllocator`] rather than
/// the `H{type:2}{seq:09d}` form literally, since both are drawn from the
/// same per-type counter and the work-order id is already globally unique
/// and traceable back to `aps_work_order_maker`/`aps_work_order_feeder`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchRecord {
    pub plan_id: String,
    pub production_line: String,
    pub material_code: String,
    pub quantity: i64,
    pub plan_start_time: String,
    pub plan_end_time: String,
    pub sequence: u32,
    pub unit: String,
    pub plan_date: String,
    pub is_backup: bool,
    pub input_batch: Vec<InputBatch>,
}

/// Builds the dispatch record for `order`. Returns `None` for a backup
/// maker order (`is_backup = true`): backup orders are persisted and shown
/// on the dashboard but never handed to the MES, per the decision recorded
/// in the design ledger for open question (b) — dispatching both the
/// primary and its backup would double-report capacity.
pub fn dispatch_record_for(order: &WorkOrder, production_unit: &str) -> Option<DispatchRecord> {
    match order {
        WorkOrder::MakerOrder { is_backup: true, .. } => None,
        WorkOrder::MakerOrder {
            id,
            maker_code,
            article_code,
            final_quantity,
            planned_start,
            planned_end,
            sequence,
            plan_date,
            related_feeder_order,
            ..
        } => Some(DispatchRecord {
            plan_id: id.clone(),
            production_line: maker_code.clone(),
            material_code: article_code.clone(),
            quantity: *final_quantity,
            plan_start_time: format_plan_datetime(*planned_start),
            plan_end_time: format_plan_datetime(*planned_end),
            sequence: *sequence,
            unit: production_unit.to_string(),
            plan_date: format_plan_date(*plan_date),
            is_backup: false,
            input_batch: related_feeder_order
                .iter()
                .map(|feeder_id| InputBatch {
                    input_plan_id: feeder_id.clone(),
                    material_code: article_code.clone(),
                    is_main_channel: true,
                    is_last_one: None,
                    is_deleted: false,
                })
                .collect(),
        }),
        WorkOrder::FeederOrder { id, feeder_code, article_code, total_quantity, planned_start, planned_end, plan_date, related_maker_orders } => {
            let last_index = related_maker_orders.len().saturating_sub(1);
            Some(DispatchRecord {
                plan_id: id.clone(),
                production_line: feeder_code.clone(),
                material_code: article_code.clone(),
                quantity: *total_quantity,
                plan_start_time: format_plan_datetime(*planned_start),
                plan_end_time: format_plan_datetime(*planned_end),
                sequence: 1,
                unit: production_unit.to_string(),
                plan_date: format_plan_date(*plan_date),
                is_backup: false,
                input_batch: related_maker_orders
                    .iter()
                    .enumerate()
                    .map(|(i, maker_id)| InputBatch {
                        input_plan_id: maker_id.clone(),
                        material_code: article_code.clone(),
                        is_main_channel: true,
                        is_last_one: Some(i == last_index),
                        is_deleted: false,
                    })
                    .collect(),
            })
        }
    }
}

/// The MES's acknowledgement for one dispatched record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResponse {
    pub result: DispatchResult,
    pub reason: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "u8", try_from = "u8")]
pub enum DispatchResult {
    Accepted = 1,
    Rejected = 2,
}

impl From<DispatchResult> for u8 {
    fn from(value: DispatchResult) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for DispatchResult {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(DispatchResult::Accepted),
            2 => Ok(DispatchResult::Rejected),
            other => Err(format!("unknown MES dispatch result code {other}")),
        }
    }
}

/// Transport seam the dispatcher drives; the wire protocol implementing it
/// (HTTP, message queue, ...) is out of scope for this crate.
pub trait MesTransport {
    fn send(&self, record: &DispatchRecord) -> Result<DispatchResponse>;
}

/// Dispatches [`DispatchRecord`]s through a [`MesTransport`], retrying a
/// `Rejected` response with exponential backoff up to
/// [`MAX_DISPATCH_ATTEMPTS`] (§6/§7).
pub struct MesDispatcher<T: MesTransport> {
    transport: T,
    initial_backoff: Duration,
}

impl<T: MesTransport> MesDispatcher<T> {
    pub fn new(transport: T) -> Self {
        MesDispatcher { transport, initial_backoff: Duration::from_millis(500) }
    }

    pub fn with_initial_backoff(transport: T, initial_backoff: Duration) -> Self {
        MesDispatcher { transport, initial_backoff }
    }

    /// Sends `record`, retrying on `Result = 2` responses. Returns the final
    /// response once it's `Accepted`, or once attempts are exhausted.
    pub fn dispatch(&self, record: &DispatchRecord) -> Result<DispatchResponse> {
        let mut attempt = 0u32;
        let mut backoff = self.initial_backoff;
        loop {
            attempt += 1;
            let response = self.transport.send(record)?;
            match response.result {
                DispatchResult::Accepted => return Ok(response),
                DispatchResult::Rejected if attempt < MAX_DISPATCH_ATTEMPTS => {
                    warn!(plan_id = %record.plan_id, attempt, reason = ?response.reason, "MES rejected dispatch, retrying");
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                DispatchResult::Rejected => {
                    return Err(Error::Internal(format!(
                        "MES dispatch for {} rejected after {} attempts: {:?}",
                        record.plan_id, attempt, response.reason
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;

    fn maker(is_backup: bool, related_feeder_order: Option<String>) -> WorkOrder {
        WorkOrder::MakerOrder {
            id: "HJB202411100001".into(),
            maker_code: "M1".into(),
            article_code: "ART1".into(),
            input_quantity: 500,
            final_quantity: 500,
            planned_start: Utc.with_ymd_and_hms(2024, 11, 10, 8, 0, 0).unwrap(),
            planned_end: Utc.with_ymd_and_hms(2024, 11, 10, 16, 0, 0).unwrap(),
            sequence: 1,
            plan_date: NaiveDate::from_ymd_opt(2024, 11, 10).unwrap(),
            related_feeder_order,
            is_backup,
            backup_reason: if is_backup { Some("spans month boundary".into()) } else { None },
            split_from: None,
            split_index: None,
            merged_from: vec![],
        }
    }

    #[test]
    fn backup_maker_orders_are_excluded_from_dispatch() {
        assert!(dispatch_record_for(&maker(true, None), "line1").is_none());
    }

    #[test]
    fn primary_maker_order_carries_its_feeder_as_input_batch() {
        let order = maker(false, Some("HWS202411100001".into()));
        let record = dispatch_record_for(&order, "line1").unwrap();
        assert_eq!(record.plan_id, "HJB202411100001");
        assert_eq!(record.input_batch.len(), 1);
        assert_eq!(record.input_batch[0].input_plan_id, "HWS202411100001");
        assert!(record.input_batch[0].is_main_channel);
        assert_eq!(record.plan_start_time, "2024/11/10 08:00:00");
    }

    #[test]
    fn feeder_order_marks_its_last_upstream_material() {
        let order = WorkOrder::FeederOrder {
            id: "HWS202411100001".into(),
            feeder_code: "F1".into(),
            article_code: "ART1".into(),
            total_quantity: 525,
            planned_start: Utc.with_ymd_and_hms(2024, 11, 10, 8, 0, 0).unwrap(),
            planned_end: Utc.with_ymd_and_hms(2024, 11, 10, 16, 0, 0).unwrap(),
            plan_date: NaiveDate::from_ymd_opt(2024, 11, 10).unwrap(),
            related_maker_orders: vec!["HJB202411100001".into(), "HJB202411100002".into()],
        };
        let record = dispatch_record_for(&order, "line1").unwrap();
        assert_eq!(record.input_batch.len(), 2);
        assert_eq!(record.input_batch[0].is_last_one, Some(false));
        assert_eq!(record.input_batch[1].is_last_one, Some(true));
    }

    struct FlakyTransport {
        responses: RefCell<Vec<DispatchResult>>,
    }

    impl MesTransport for FlakyTransport {
        fn send(&self, _record: &DispatchRecord) -> Result<DispatchResponse> {
            let result = self.responses.borrow_mut().remove(0);
            Ok(DispatchResponse { result, reason: None, error_code: None, error_message: None })
        }
    }

    #[test]
    fn dispatch_retries_rejections_until_accepted() {
        let transport = FlakyTransport { responses: RefCell::new(vec![DispatchResult::Rejected, DispatchResult::Accepted]) };
        let dispatcher = MesDispatcher::with_initial_backoff(transport, Duration::from_millis(1));
        let order = maker(false, None);
        let record = dispatch_record_for(&order, "line1").unwrap();
        let response = dispatcher.dispatch(&record).unwrap();
        assert_eq!(response.result, DispatchResult::Accepted);
    }

    #[test]
    fn dispatch_gives_up_after_max_attempts() {
        let transport = FlakyTransport { responses: RefCell::new(vec![DispatchResult::Rejected; MAX_DISPATCH_ATTEMPTS as usize]) };
        let dispatcher = MesDispatcher::with_initial_backoff(transport, Duration::from_millis(1));
        let order = maker(false, None);
        let record = dispatch_record_for(&order, "line1").unwrap();
        assert!(dispatcher.dispatch(&record).is_err());
    }
}
