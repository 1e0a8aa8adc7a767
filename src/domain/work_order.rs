use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::ValidationStatus;

/// One step in a draft's transform history, recorded by every pipeline stage
/// that mutates an order, so lineage can be reconstructed for diagnostics
/// and for the deterministic-output property (§8, invariant 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformStep {
    pub stage: String,
    pub before_start: DateTime<Utc>,
    pub before_end: DateTime<Utc>,
    pub after_start: DateTime<Utc>,
    pub after_end: DateTime<Utc>,
    pub reason: String,
}

/// In-pipeline order. A draft is produced by the parser (one per valid
/// [`crate::domain::PlanRow`]) and rewritten by each pipeline stage; it is
/// never mutated in place, each stage returns new drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrderDraft {
    pub id: String,
    pub origin_batch: String,
    pub lineage: Vec<String>,
    pub transform_history: Vec<TransformStep>,
    pub article_code: String,
    pub maker_code: Option<String>,
    pub maker_codes: Vec<String>,
    pub feeder_code: Option<String>,
    pub feeder_codes: Vec<String>,
    pub input_quantity: i64,
    pub final_quantity: i64,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub priority: u32,
    pub production_unit: String,
    pub validation_status: ValidationStatus,
    /// Set when this draft was produced by splitting a parent; the parallel-
    /// synchronization stage groups siblings by this key.
    pub split_parent: Option<String>,
    pub split_index: Option<u32>,
    pub merged_from: Vec<String>,
}

impl WorkOrderDraft {
    pub fn record_transform(&mut self, stage: &str, before_start: DateTime<Utc>, before_end: DateTime<Utc>, reason: impl Into<String>) {
        self.transform_history.push(TransformStep {
            stage: stage.to_string(),
            before_start,
            before_end,
            after_start: self.planned_start,
            after_end: self.planned_end,
            reason: reason.into(),
        });
    }

    pub fn required_duration(&self, rate_per_hour: f64, efficiency: f64) -> chrono::Duration {
        let hours = self.final_quantity as f64 / (rate_per_hour * efficiency).max(0.0001);
        chrono::Duration::minutes((hours * 60.0).ceil() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Maker,
    Feeder,
}

/// Terminal, emitted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkOrder {
    MakerOrder {
        id: String,
        maker_code: String,
        article_code: String,
        input_quantity: i64,
        final_quantity: i64,
        planned_start: DateTime<Utc>,
        planned_end: DateTime<Utc>,
        sequence: u32,
        plan_date: chrono::NaiveDate,
        related_feeder_order: Option<String>,
        is_backup: bool,
        backup_reason: Option<String>,
        split_from: Option<String>,
        split_index: Option<u32>,
        merged_from: Vec<String>,
    },
    FeederOrder {
        id: String,
        feeder_code: String,
        article_code: String,
        total_quantity: i64,
        planned_start: DateTime<Utc>,
        planned_end: DateTime<Utc>,
        plan_date: chrono::NaiveDate,
        related_maker_orders: Vec<String>,
    },
}

impl WorkOrder {
    pub fn id(&self) -> &str {
        match self {
            WorkOrder::MakerOrder { id, .. } => id,
            WorkOrder::FeederOrder { id, .. } => id,
        }
    }

    pub fn kind(&self) -> OrderKind {
        match self {
            WorkOrder::MakerOrder { .. } => OrderKind::Maker,
            WorkOrder::FeederOrder { .. } => OrderKind::Feeder,
        }
    }

    pub fn interval(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            WorkOrder::MakerOrder { planned_start, planned_end, .. } => (*planned_start, *planned_end),
            WorkOrder::FeederOrder { planned_start, planned_end, .. } => (*planned_start, *planned_end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> WorkOrderDraft {
        WorkOrderDraft {
            id: "D1".into(),
            origin_batch: "b1".into(),
            lineage: vec!["W1".into()],
            transform_history: vec![],
            article_code: "ART1".into(),
            maker_code: Some("M1".into()),
            maker_codes: vec!["M1".into()],
            feeder_code: Some("F1".into()),
            feeder_codes: vec!["F1".into()],
            input_quantity: 500,
            final_quantity: 500,
            planned_start: Utc::now(),
            planned_end: Utc::now() + chrono::Duration::hours(8),
            priority: 5,
            production_unit: "line1".into(),
            validation_status: ValidationStatus::Valid,
            split_parent: None,
            split_index: None,
            merged_from: vec![],
        }
    }

    #[test]
    fn required_duration_scales_with_quantity_and_speed() {
        let draft = sample_draft();
        let dur = draft.required_duration(70.0, 1.0);
        // 500 / 70 = 7.14h -> rounds up to 8 hours (428.57min -> 429min)
        assert!(dur.num_minutes() >= 428 && dur.num_minutes() <= 429);
    }

    #[test]
    fn record_transform_appends_history_entry() {
        let mut draft = sample_draft();
        let before_start = draft.planned_start;
        let before_end = draft.planned_end;
        draft.planned_start = before_start + chrono::Duration::hours(1);
        draft.record_transform("time_correction", before_start, before_end, "maintenance shift");
        assert_eq!(draft.transform_history.len(), 1);
        assert_eq!(draft.transform_history[0].stage, "time_correction");
    }
}
