use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Diagnostic, DiagnosticKind, ValidationStatus, WorkOrderDraft};
use crate::reference_data::{MachineRelationService, MaintenanceService, ReferenceData, SpeedService};

use super::StageOutcome;

/// Outer-pass bound: parallel → sequential → parallel, per §4.5. An order
/// set still unstable after this many passes is escalated to
/// `manual-review` instead of oscillating forever.
const MAX_OUTER_PASSES: u32 = 3;
/// Retry bound while advancing a parallel group's unified start to clear
/// every member's maintenance windows.
const MAX_SYNC_RETRIES: u32 = 16;

fn required_duration(draft: &WorkOrderDraft, speed: &SpeedService<'_>) -> Duration {
    let maker = draft.maker_code.as_deref().unwrap_or_default();
    let (rate, efficiency) = speed.rate_for(maker, &draft.article_code);
    draft.required_duration(rate, efficiency)
}

fn is_feasible(draft: &WorkOrderDraft, maintenance: &MaintenanceService<'_>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let maker = draft.maker_code.as_deref().unwrap_or_default();
    maintenance.overlapping(maker, start, end).is_empty()
}

/// Unifies the interval of every member of one parallel group (siblings
/// produced by splitting the same parent), per §4.5. Returns `true` when a
/// feasible unified interval was found within the retry bound.
fn synchronize_group(members: &mut [WorkOrderDraft], maintenance: &MaintenanceService<'_>, speed: &SpeedService<'_>) -> bool {
    let mut unified_start = members.iter().map(|m| m.planned_start).max().unwrap();
    let required = members.iter().map(|m| required_duration(m, speed)).max().unwrap_or(Duration::zero());

    for _ in 0..MAX_SYNC_RETRIES {
        let unified_end = unified_start + required;
        let mut next_start: Option<DateTime<Utc>> = None;

        for m in members.iter() {
            if !is_feasible(m, maintenance, unified_start, unified_end) {
                let maker = m.maker_code.as_deref().unwrap_or_default();
                if let Some(w) = maintenance.overlapping(maker, unified_start, unified_end).into_iter().max_by_key(|w| w.end) {
                    let candidate = w.end;
                    next_start = Some(next_start.map_or(candidate, |c: DateTime<Utc>| c.max(candidate)));
                }
            }
        }

        match next_start {
            None => {
                for m in members.iter_mut() {
                    let before_s = m.planned_start;
                    let before_e = m.planned_end;
                    m.planned_start = unified_start;
                    m.planned_end = unified_end;
                    m.record_transform("parallel_sync", before_s, before_e, "unified with sibling split orders");
                }
                return true;
            }
            Some(advance_to) => unified_start = advance_to,
        }
    }

    false
}

/// Shifts an entire chain's member (and, if it belongs to a parallel group,
/// every sibling) by `delta`, preserving each order's duration.
fn shift_by(draft: &mut WorkOrderDraft, delta: Duration, reason: &str) {
    let before_s = draft.planned_start;
    let before_e = draft.planned_end;
    draft.planned_start = draft.planned_start + delta;
    draft.planned_end = draft.planned_end + delta;
    draft.record_transform("parallel_sync", before_s, before_e, reason.to_string());
}

/// Sequentially chains every order sharing one feeder so consecutive orders
/// never overlap, honoring the feeder's changeover interval.
///
/// Siblings of the same split share one feeder by construction (§4.3) and
/// are a single simultaneous supply event, not a sequence — so they collapse
/// into one chain entry keyed by their parent id; a shift applied to that
/// entry propagates to every sibling, preserving the unified interval.
fn chain_feeder(
    chain_ids: &[usize],
    drafts: &mut [WorkOrderDraft],
    groups_by_parent: &HashMap<String, Vec<usize>>,
    changeover: Duration,
) {
    let mut representative: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<String> = Vec::new();
    for &i in chain_ids {
        let key = drafts[i].split_parent.clone().unwrap_or_else(|| format!("__solo_{i}"));
        if !representative.contains_key(&key) {
            representative.insert(key.clone(), i);
            entries.push(key);
        }
    }

    entries.sort_by_key(|k| {
        let rep = representative[k];
        (drafts[rep].priority, drafts[rep].planned_start)
    });

    for window in 0..entries.len().saturating_sub(1) {
        let prev_rep = representative[&entries[window]];
        let cur_key = &entries[window + 1];
        let cur_rep = representative[cur_key];
        let prev_end = drafts[prev_rep].planned_end;
        let cur_start = drafts[cur_rep].planned_start;
        let required_gap = prev_end + changeover;

        if cur_start < required_gap {
            let delta = required_gap - cur_start;
            match groups_by_parent.get(cur_key) {
                Some(members) => {
                    for &m in members {
                        shift_by(&mut drafts[m], delta, "shifted with parallel group for feeder changeover");
                    }
                }
                None => shift_by(&mut drafts[cur_rep], delta, "shifted right for feeder changeover"),
            }
        }
    }
}

/// Runs §4.5 to completion: unify parallel-group intervals, then chain
/// feeder sequences, alternating up to [`MAX_OUTER_PASSES`] times. Orders
/// that remain unstable (no feasible unified interval, or still oscillating)
/// are marked `manual-review`.
pub fn synchronize(drafts: Vec<WorkOrderDraft>, reference: &ReferenceData) -> StageOutcome<WorkOrderDraft> {
    let maintenance = MaintenanceService::new(&reference.maintenance_windows);
    let speed = SpeedService::new(&reference.speed_rules);
    let relations = MachineRelationService::new(&reference.relations);

    let mut drafts = drafts;
    let mut infeasible_parents: Vec<String> = Vec::new();

    for _pass in 0..MAX_OUTER_PASSES {
        let mut groups_by_parent: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, d) in drafts.iter().enumerate() {
            if let Some(parent) = &d.split_parent {
                groups_by_parent.entry(parent.clone()).or_default().push(i);
            }
        }

        for (parent, members_idx) in groups_by_parent.iter() {
            if members_idx.len() < 2 {
                continue;
            }
            let mut members: Vec<WorkOrderDraft> = members_idx.iter().map(|&i| drafts[i].clone()).collect();
            let ok = synchronize_group(&mut members, &maintenance, &speed);
            if ok {
                for (slot, &i) in members_idx.iter().enumerate() {
                    drafts[i] = members[slot].clone();
                }
            } else if !infeasible_parents.contains(parent) {
                infeasible_parents.push(parent.clone());
            }
        }

        let mut chains: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, d) in drafts.iter().enumerate() {
            if let Some(feeder) = &d.feeder_code {
                chains.entry(feeder.clone()).or_default().push(i);
            }
        }

        let groups_snapshot: HashMap<String, Vec<usize>> = groups_by_parent.clone();
        for (feeder, members) in chains.iter() {
            let changeover = relations.changeover_interval(feeder);
            chain_feeder(members, &mut drafts, &groups_snapshot, changeover);
        }
    }

    let mut diagnostics = Vec::new();
    for d in drafts.iter_mut() {
        if let Some(parent) = &d.split_parent {
            if infeasible_parents.contains(parent) {
                d.validation_status = ValidationStatus::ManualReview;
                diagnostics.push(Diagnostic::warning(
                    0,
                    "parallel_sync",
                    DiagnosticKind::OutOfRange,
                    &d.id,
                    format!("parallel group for parent {parent} has no feasible unified interval"),
                ));
            }
        }
    }

    StageOutcome { items: drafts, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(id: &str, parent: &str, idx: u32, maker: &str, feeder: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> WorkOrderDraft {
        WorkOrderDraft {
            id: id.into(),
            origin_batch: "b1".into(),
            lineage: vec![],
            transform_history: vec![],
            article_code: "ART1".into(),
            maker_code: Some(maker.into()),
            maker_codes: vec![maker.into()],
            feeder_code: Some(feeder.into()),
            feeder_codes: vec![feeder.into()],
            input_quantity: 400,
            final_quantity: 400,
            planned_start: start,
            planned_end: end,
            priority: 5,
            production_unit: "line1".into(),
            validation_status: ValidationStatus::Valid,
            split_parent: Some(parent.into()),
            split_index: Some(idx),
            merged_from: vec![],
        }
    }

    #[test]
    fn parallel_group_members_share_identical_interval() {
        let start = Utc.with_ymd_and_hms(2024, 11, 10, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 11, 10, 16, 0, 0).unwrap();
        let drafts = vec![
            draft("P-01", "P", 1, "M1", "F1", start, end),
            draft("P-02", "P", 2, "M2", "F1", start, end),
        ];
        let reference = ReferenceData::default();
        let outcome = synchronize(drafts, &reference);
        assert_eq!(outcome.items[0].planned_start, outcome.items[1].planned_start);
        assert_eq!(outcome.items[0].planned_end, outcome.items[1].planned_end);
    }

    #[test]
    fn feeder_chain_enforces_changeover_gap() {
        // S6: two orders on F1, 08:00-10:00 and 09:00-11:00 -> second shifts to 10:15
        let s1 = Utc.with_ymd_and_hms(2024, 11, 10, 8, 0, 0).unwrap();
        let e1 = Utc.with_ymd_and_hms(2024, 11, 10, 10, 0, 0).unwrap();
        let s2 = Utc.with_ymd_and_hms(2024, 11, 10, 9, 0, 0).unwrap();
        let e2 = Utc.with_ymd_and_hms(2024, 11, 10, 11, 0, 0).unwrap();
        let mut d1 = draft("O1", "PARENT1", 1, "M1", "F1", s1, e1);
        d1.split_parent = None;
        let mut d2 = draft("O2", "PARENT2", 1, "M2", "F1", s2, e2);
        d2.split_parent = None;

        let reference = ReferenceData::default();
        let outcome = synchronize(vec![d1, d2], &reference);
        let second = outcome.items.iter().find(|d| d.id == "O2").unwrap();
        assert_eq!(second.planned_start, Utc.with_ymd_and_hms(2024, 11, 10, 10, 15, 0).unwrap());
        assert_eq!(second.planned_end, Utc.with_ymd_and_hms(2024, 11, 10, 12, 15, 0).unwrap());
    }

    #[test]
    fn parallel_group_with_no_feasible_window_is_flagged_manual_review() {
        // S5: maker M1 is back-to-back under maintenance far past the retry
        // bound, so no unified interval ever clears every member.
        use crate::domain::MaintenanceWindow;

        let start = Utc.with_ymd_and_hms(2024, 11, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 11, 10, 8, 0, 0).unwrap();
        let drafts = vec![
            draft("P-01", "P", 1, "M1", "F1", start, end),
            draft("P-02", "P", 2, "M2", "F1", start, end),
        ];

        let mut reference = ReferenceData::default();
        let mut window_start = start;
        for _ in 0..20 {
            let window_end = window_start + Duration::hours(50);
            reference.maintenance_windows.push(MaintenanceWindow {
                machine_code: "M1".to_string(),
                start: window_start,
                end: window_end,
                status: "scheduled".to_string(),
            });
            window_start = window_end;
        }

        let outcome = synchronize(drafts, &reference);
        let p01 = outcome.items.iter().find(|d| d.id == "P-01").unwrap();
        assert_eq!(p01.validation_status, ValidationStatus::ManualReview);
        assert!(outcome.diagnostics.iter().any(|d| d.message.contains("no feasible unified interval")));
    }
}
