//! §4.6 Work-Order Emission: the terminal stage. Turns the synchronized
//! drafts into maker orders (one per draft), feeder orders (one per feeder,
//! aggregating the chain scheduled on it), and backup maker-only duplicates
//! for any draft whose interval crosses a month boundary.

use std::collections::HashMap;

use chrono::Datelike;

use crate::domain::{OrderKind, WorkOrder, WorkOrderDraft};
use crate::error::Result;
use crate::reference_data::ReferenceData;
use crate::sequence::IdAllocator;

use super::StageOutcome;

/// Safety-stock multiplier applied to a feeder order's aggregate quantity.
const SAFETY_STOCK_FACTOR: f64 = 1.05;

fn spans_month_boundary(draft: &WorkOrderDraft) -> bool {
    draft.planned_start.month() != draft.planned_end.month() || draft.planned_start.year() != draft.planned_end.year()
}

/// Emits every maker order (plus backup duplicates) and aggregated feeder
/// orders for `drafts`, assigning ids from `allocator` and per-machine,
/// per-plan-date sequence numbers in start-time order.
pub fn emit_work_orders(drafts: Vec<WorkOrderDraft>, reference: &ReferenceData, allocator: &IdAllocator) -> Result<StageOutcome<WorkOrder>> {
    let _ = reference;

    let mut maker_orders: Vec<WorkOrder> = Vec::with_capacity(drafts.len());
    let mut feeder_groups: HashMap<String, Vec<(String, i64, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>> = HashMap::new();

    // index-preserving so sequence assignment below can see each draft's
    // assigned maker order id and (maker_code, plan_date) group key
    let mut by_maker_date: HashMap<(String, chrono::NaiveDate), Vec<usize>> = HashMap::new();
    let mut assigned_ids: Vec<String> = Vec::with_capacity(drafts.len());

    for (idx, draft) in drafts.iter().enumerate() {
        let plan_date = draft.planned_start.date_naive();
        let maker_id = allocator.next_id(OrderKind::Maker, plan_date)?;
        assigned_ids.push(maker_id.clone());

        let maker_code = draft.maker_code.clone().unwrap_or_default();
        by_maker_date.entry((maker_code, plan_date)).or_default().push(idx);

        if let Some(feeder) = &draft.feeder_code {
            feeder_groups.entry(feeder.clone()).or_default().push((
                maker_id.clone(),
                draft.final_quantity,
                draft.planned_start,
                draft.planned_end,
            ));
        }
    }

    // 1-based sequence number per (maker_code, plan_date), ordered by start time.
    let mut sequence_of: HashMap<usize, u32> = HashMap::new();
    for indices in by_maker_date.values() {
        let mut ordered: Vec<usize> = indices.clone();
        ordered.sort_by_key(|&i| drafts[i].planned_start);
        for (seq, &i) in ordered.iter().enumerate() {
            sequence_of.insert(i, seq as u32 + 1);
        }
    }

    for (idx, draft) in drafts.iter().enumerate() {
        let maker_id = assigned_ids[idx].clone();
        let plan_date = draft.planned_start.date_naive();
        let sequence = *sequence_of.get(&idx).unwrap_or(&1);
        let related_feeder_order = draft.feeder_code.clone();

        maker_orders.push(WorkOrder::MakerOrder {
            id: maker_id.clone(),
            maker_code: draft.maker_code.clone().unwrap_or_default(),
            article_code: draft.article_code.clone(),
            input_quantity: draft.input_quantity,
            final_quantity: draft.final_quantity,
            planned_start: draft.planned_start,
            planned_end: draft.planned_end,
            sequence,
            plan_date,
            related_feeder_order: related_feeder_order.clone(),
            is_backup: false,
            backup_reason: None,
            split_from: draft.split_parent.clone(),
            split_index: draft.split_index,
            merged_from: draft.merged_from.clone(),
        });

        if spans_month_boundary(draft) {
            let backup_id = allocator.next_id(OrderKind::Maker, plan_date)?;
            maker_orders.push(WorkOrder::MakerOrder {
                id: backup_id,
                maker_code: draft.maker_code.clone().unwrap_or_default(),
                article_code: draft.article_code.clone(),
                input_quantity: draft.input_quantity,
                final_quantity: draft.final_quantity,
                planned_start: draft.planned_start,
                planned_end: draft.planned_end,
                sequence,
                plan_date,
                related_feeder_order: None,
                is_backup: true,
                backup_reason: Some(format!("order {maker_id} spans a month boundary ({} -> {})", draft.planned_start, draft.planned_end)),
                split_from: draft.split_parent.clone(),
                split_index: draft.split_index,
                merged_from: draft.merged_from.clone(),
            });
        }
    }

    let mut feeder_orders = Vec::with_capacity(feeder_groups.len());
    for (feeder_code, members) in feeder_groups.into_iter() {
        let article_code = drafts
            .iter()
            .find(|d| d.feeder_code.as_deref() == Some(feeder_code.as_str()))
            .map(|d| d.article_code.clone())
            .unwrap_or_default();
        let sum: i64 = members.iter().map(|(_, qty, _, _)| *qty).sum();
        let total_quantity = (sum as f64 * SAFETY_STOCK_FACTOR).ceil() as i64;
        let start = members.iter().map(|(_, _, s, _)| *s).min().unwrap();
        let end = members.iter().map(|(_, _, _, e)| *e).max().unwrap();
        let plan_date = start.date_naive();
        let related_maker_orders: Vec<String> = members.into_iter().map(|(id, _, _, _)| id).collect();

        let feeder_id = allocator.next_id(OrderKind::Feeder, plan_date)?;
        feeder_orders.push(WorkOrder::FeederOrder {
            id: feeder_id,
            feeder_code,
            article_code,
            total_quantity,
            planned_start: start,
            planned_end: end,
            plan_date,
            related_maker_orders,
        });
    }

    let mut items = maker_orders;
    items.extend(feeder_orders);
    Ok(StageOutcome::new(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationStatus;
    use chrono::{TimeZone, Utc};
    use rusqlite::Connection;

    fn draft(id: &str, maker: &str, feeder: &str, qty: i64, start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>) -> WorkOrderDraft {
        WorkOrderDraft {
            id: id.into(),
            origin_batch: "b1".into(),
            lineage: vec![id.into()],
            transform_history: vec![],
            article_code: "ART1".into(),
            maker_code: Some(maker.into()),
            maker_codes: vec![maker.into()],
            feeder_code: Some(feeder.into()),
            feeder_codes: vec![feeder.into()],
            input_quantity: qty,
            final_quantity: qty,
            planned_start: start,
            planned_end: end,
            priority: 5,
            production_unit: "line1".into(),
            validation_status: ValidationStatus::Valid,
            split_parent: None,
            split_index: None,
            merged_from: vec![],
        }
    }

    #[test]
    fn s1_single_row_emits_matching_maker_and_safety_stock_feeder_order() {
        let start = Utc.with_ymd_and_hms(2024, 11, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 11, 1, 16, 0, 0).unwrap();
        let drafts = vec![draft("W1", "M1", "F1", 500, start, end)];
        let reference = ReferenceData::default();
        let allocator = IdAllocator::new(Connection::open_in_memory().unwrap()).unwrap();

        let outcome = emit_work_orders(drafts, &reference, &allocator).unwrap();
        assert_eq!(outcome.items.len(), 2);

        let maker = outcome.items.iter().find(|o| matches!(o, WorkOrder::MakerOrder { .. })).unwrap();
        if let WorkOrder::MakerOrder { final_quantity, is_backup, .. } = maker {
            assert_eq!(*final_quantity, 500);
            assert!(!is_backup);
        }

        let feeder = outcome.items.iter().find(|o| matches!(o, WorkOrder::FeederOrder { .. })).unwrap();
        if let WorkOrder::FeederOrder { total_quantity, .. } = feeder {
            assert_eq!(*total_quantity, 525);
        }
    }

    #[test]
    fn orders_spanning_a_month_boundary_get_a_backup_duplicate() {
        let start = Utc.with_ymd_and_hms(2024, 11, 30, 20, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 1, 4, 0, 0).unwrap();
        let drafts = vec![draft("W1", "M1", "F1", 500, start, end)];
        let reference = ReferenceData::default();
        let allocator = IdAllocator::new(Connection::open_in_memory().unwrap()).unwrap();

        let outcome = emit_work_orders(drafts, &reference, &allocator).unwrap();
        let backups: Vec<_> = outcome
            .items
            .iter()
            .filter(|o| matches!(o, WorkOrder::MakerOrder { is_backup: true, .. }))
            .collect();
        assert_eq!(backups.len(), 1);
        if let WorkOrder::MakerOrder { backup_reason, related_feeder_order, .. } = backups[0] {
            assert!(backup_reason.is_some());
            assert!(related_feeder_order.is_none());
        }
    }

    #[test]
    fn sequence_numbers_assigned_one_based_by_start_time_per_machine() {
        let s1 = Utc.with_ymd_and_hms(2024, 11, 1, 8, 0, 0).unwrap();
        let e1 = Utc.with_ymd_and_hms(2024, 11, 1, 10, 0, 0).unwrap();
        let s2 = Utc.with_ymd_and_hms(2024, 11, 1, 11, 0, 0).unwrap();
        let e2 = Utc.with_ymd_and_hms(2024, 11, 1, 13, 0, 0).unwrap();
        let drafts = vec![draft("W2", "M1", "F1", 200, s2, e2), draft("W1", "M1", "F1", 200, s1, e1)];
        let reference = ReferenceData::default();
        let allocator = IdAllocator::new(Connection::open_in_memory().unwrap()).unwrap();

        let outcome = emit_work_orders(drafts, &reference, &allocator).unwrap();
        let mut makers: Vec<_> = outcome
            .items
            .iter()
            .filter_map(|o| match o {
                WorkOrder::MakerOrder { planned_start, sequence, .. } => Some((*planned_start, *sequence)),
                _ => None,
            })
            .collect();
        makers.sort_by_key(|(start, _)| *start);
        assert_eq!(makers[0].1, 1);
        assert_eq!(makers[1].1, 2);
    }
}
