use chrono::Duration;

use crate::domain::WorkOrderDraft;
use crate::reference_data::{ReferenceData, SpeedService};

use super::StageOutcome;

/// A draft's interval longer than this is considered to exceed one shift,
/// the third split trigger in §4.3. Chosen as the longest of the three
/// default shifts (early, 06:40–15:40).
const SHIFT_LENGTH_HOURS: i64 = 9;

fn exceeds_single_machine_capacity(draft: &WorkOrderDraft, speed: &SpeedService) -> bool {
    if draft.maker_codes.len() != 1 {
        return false;
    }
    let maker = &draft.maker_codes[0];
    let (rate, efficiency) = speed.rate_for(maker, &draft.article_code);
    let available_hours = (draft.planned_end - draft.planned_start).num_minutes() as f64 / 60.0;
    let capacity = rate * efficiency * available_hours.max(0.0);
    (draft.final_quantity as f64) > capacity
}

fn exceeds_one_shift(draft: &WorkOrderDraft) -> bool {
    draft.planned_end - draft.planned_start > Duration::hours(SHIFT_LENGTH_HOURS)
}

/// Whether `draft` must be split per §4.3: more than one maker, quantity
/// beyond single-machine daily capacity, or an interval longer than a shift.
pub fn requires_split(draft: &WorkOrderDraft, speed: &SpeedService) -> bool {
    draft.maker_codes.len() > 1 || exceeds_single_machine_capacity(draft, speed) || exceeds_one_shift(draft)
}

/// Splits base+remainder across `n` ordered buckets: Σ = `total`, the first
/// `total mod n` buckets get one extra unit.
fn allocate(total: i64, n: usize) -> Vec<i64> {
    let n = n as i64;
    let base = total / n;
    let remainder = total % n;
    (0..n).map(|i| if i < remainder { base + 1 } else { base }).collect()
}

/// Splits one draft targeting multiple makers into one child per maker, all
/// sharing the parent's feeder and interval. A draft with a single maker
/// that still trips §4.3's capacity/shift triggers is "split" into exactly
/// one child, so the `children == |maker-list|` invariant holds universally.
pub fn split_draft(draft: &WorkOrderDraft, reference: &ReferenceData) -> StageOutcome<WorkOrderDraft> {
    let speed = SpeedService::new(&reference.speed_rules);

    if !requires_split(draft, &speed) {
        return StageOutcome::new(vec![draft.clone()]);
    }

    let mut makers = draft.maker_codes.clone();
    if makers.is_empty() {
        makers.push(draft.maker_code.clone().unwrap_or_default());
    }
    makers.sort();

    let shared_feeder = draft.feeder_codes.first().cloned().or_else(|| draft.feeder_code.clone());

    let input_shares = allocate(draft.input_quantity, makers.len());
    let final_shares = allocate(draft.final_quantity, makers.len());

    let mut children = Vec::with_capacity(makers.len());
    for (idx, maker) in makers.iter().enumerate() {
        let mut child = draft.clone();
        child.id = format!("{}-{:02}", draft.id, idx + 1);
        child.maker_code = Some(maker.clone());
        child.maker_codes = vec![maker.clone()];
        child.feeder_code = shared_feeder.clone();
        child.input_quantity = input_shares[idx];
        child.final_quantity = final_shares[idx];
        child.split_parent = Some(draft.id.clone());
        child.split_index = Some((idx + 1) as u32);
        child.record_transform(
            "split",
            draft.planned_start,
            draft.planned_end,
            format!("split {} of {} from parent {}", idx + 1, makers.len(), draft.id),
        );
        children.push(child);
    }

    StageOutcome::new(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationStatus;
    use chrono::{TimeZone, Utc};

    fn base_draft() -> WorkOrderDraft {
        WorkOrderDraft {
            id: "W1".into(),
            origin_batch: "b1".into(),
            lineage: vec!["W1".into()],
            transform_history: vec![],
            article_code: "ART1".into(),
            maker_code: None,
            maker_codes: vec!["M1".into(), "M2".into(), "M3".into()],
            feeder_code: None,
            feeder_codes: vec!["F1".into()],
            input_quantity: 1000,
            final_quantity: 1000,
            planned_start: Utc.with_ymd_and_hms(2024, 11, 1, 8, 0, 0).unwrap(),
            planned_end: Utc.with_ymd_and_hms(2024, 11, 1, 16, 0, 0).unwrap(),
            priority: 5,
            production_unit: "line1".into(),
            validation_status: ValidationStatus::Valid,
            split_parent: None,
            split_index: None,
            merged_from: vec![],
        }
    }

    #[test]
    fn splits_1000_across_three_makers_as_334_333_333() {
        let draft = base_draft();
        let reference = ReferenceData::default();
        let outcome = split_draft(&draft, &reference);
        assert_eq!(outcome.items.len(), 3);
        let mut quantities: Vec<i64> = outcome.items.iter().map(|d| d.input_quantity).collect();
        quantities.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(quantities, vec![334, 333, 333]);
        let sum: i64 = outcome.items.iter().map(|d| d.input_quantity).sum();
        assert_eq!(sum, 1000);
        assert_eq!(outcome.items[0].id, "W1-01");
        assert_eq!(outcome.items[1].id, "W1-02");
        assert_eq!(outcome.items[2].id, "W1-03");
    }

    #[test]
    fn every_child_has_exactly_one_maker_and_feeder() {
        let draft = base_draft();
        let reference = ReferenceData::default();
        let outcome = split_draft(&draft, &reference);
        for child in &outcome.items {
            assert_eq!(child.maker_codes.len(), 1);
            assert!(child.feeder_code.is_some());
            assert_eq!(child.split_parent.as_deref(), Some("W1"));
        }
    }

    #[test]
    fn single_maker_under_capacity_passes_through_unchanged() {
        let mut draft = base_draft();
        draft.maker_codes = vec!["M1".into()];
        draft.input_quantity = 10;
        draft.final_quantity = 10;
        let reference = ReferenceData::default();
        let outcome = split_draft(&draft, &reference);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].id, "W1");
        assert!(outcome.items[0].split_parent.is_none());
    }
}
