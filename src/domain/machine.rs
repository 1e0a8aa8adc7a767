use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineKind {
    Maker,
    Feeder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub code: String,
    pub kind: MachineKind,
    pub equipment_model: String,
    pub active: bool,
}

/// Links a feeder to the maker machines it supplies. The inverse of this
/// relation is the canonical "same work order family" grouping rule used by
/// the parallel-synchronization stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRelation {
    pub feeder_code: String,
    pub maker_code: String,
    pub priority: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    /// Per-feeder override of the global changeover interval (Open Question
    /// (a) in the design notes: per-feeder wins, global `AppConfig` value is
    /// the fallback).
    pub changeover_override: Option<chrono::Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedRule {
    /// `None` means wildcard (`*`).
    pub machine_code: Option<String>,
    pub article_code: Option<String>,
    pub rate_boxes_per_hour: f64,
    pub efficiency: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl SpeedRule {
    /// Specificity score used to pick the most-specific match: machine+article
    /// beats machine+wildcard beats wildcard+wildcard.
    pub fn specificity(&self) -> u8 {
        let mut score = 0;
        if self.machine_code.is_some() {
            score += 2;
        }
        if self.article_code.is_some() {
            score += 1;
        }
        score
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftDef {
    pub shift_name: String,
    /// `None` means applies to every machine.
    pub machine_code: Option<String>,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub overtime_allowed: bool,
    pub max_overtime_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub machine_code: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_rule_specificity_orders_machine_article_highest() {
        let wildcard = SpeedRule {
            machine_code: None,
            article_code: None,
            rate_boxes_per_hour: 8.0,
            efficiency: 0.9,
            valid_from: Utc::now(),
            valid_to: None,
        };
        let machine_only = SpeedRule {
            machine_code: Some("M1".into()),
            ..wildcard.clone()
        };
        let machine_and_article = SpeedRule {
            article_code: Some("ART1".into()),
            ..machine_only.clone()
        };
        assert!(machine_and_article.specificity() > machine_only.specificity());
        assert!(machine_only.specificity() > wildcard.specificity());
    }
}
