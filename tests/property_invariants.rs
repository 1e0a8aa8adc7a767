//! Property-based checks for the allocation and grouping invariants named in
//! the spec's testable-properties section: split-sum conservation (#3) and
//! merge idempotence (#2).

use aps_scheduler::{merge_rows, split_draft, PlanRow, ReferenceData, ValidationStatus};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn base_row(qty: i64, maker_count: usize) -> PlanRow {
    let start = Utc.with_ymd_and_hms(2024, 11, 1, 8, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 11, 1, 16, 0, 0).unwrap();
    PlanRow {
        batch_id: "prop".into(),
        row_index: 0,
        work_order_id: "W1".into(),
        article_code: "ART1".into(),
        package_type: "box".into(),
        specification: "84mm".into(),
        production_unit: "line1".into(),
        feeder_codes: vec!["F1".into()],
        maker_codes: (0..maker_count).map(|i| format!("M{i}")).collect(),
        input_quantity: qty,
        final_quantity: qty,
        planned_start: start,
        planned_end: end,
        validation_status: ValidationStatus::Valid,
        validation_message: None,
    }
}

fn next_id_fn() -> impl FnMut() -> String {
    let mut counter = 0u32;
    move || {
        counter += 1;
        format!("D{counter}")
    }
}

proptest! {
    /// Invariant #3: splitting a draft across n makers always conserves the
    /// total quantity exactly, and produces exactly one child per maker.
    #[test]
    fn split_sum_conserves_quantity(qty in 1i64..1_000_000, maker_count in 1usize..12) {
        let row = base_row(qty, maker_count);
        let mut next_id = next_id_fn();
        let draft = aps_scheduler::draft_from_single(&row, next_id());
        let reference = ReferenceData::default();

        let outcome = split_draft(&draft, &reference);
        prop_assert_eq!(outcome.items.len(), maker_count);

        let input_sum: i64 = outcome.items.iter().map(|d| d.input_quantity).sum();
        let final_sum: i64 = outcome.items.iter().map(|d| d.final_quantity).sum();
        prop_assert_eq!(input_sum, draft.input_quantity);
        prop_assert_eq!(final_sum, draft.final_quantity);

        for child in &outcome.items {
            prop_assert_eq!(child.maker_codes.len(), 1);
            prop_assert!(child.feeder_code.is_some());
        }
    }

    /// Invariant #2: merging an already-merged set yields the same set
    /// pointwise (ids, intervals, quantities unchanged on a second pass over
    /// singleton drafts reinterpreted as rows with identical keys).
    #[test]
    fn merge_of_singletons_is_stable_under_a_second_pass(qty1 in 1i64..100_000, qty2 in 1i64..100_000) {
        let start1 = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        let end1 = Utc.with_ymd_and_hms(2024, 11, 1, 23, 59, 59).unwrap();
        let start2 = Utc.with_ymd_and_hms(2024, 11, 2, 0, 0, 0).unwrap();
        let end2 = Utc.with_ymd_and_hms(2024, 11, 2, 23, 59, 59).unwrap();

        let mut row1 = base_row(qty1, 1);
        row1.work_order_id = "R1".into();
        row1.planned_start = start1;
        row1.planned_end = end1;

        let mut row2 = base_row(qty2, 1);
        row2.work_order_id = "R2".into();
        row2.row_index = 1;
        row2.planned_start = start2;
        row2.planned_end = end2;

        let rows = vec![row1, row2];
        let mut next_id = next_id_fn();
        let first_pass = merge_rows(&rows, &mut next_id);
        prop_assert_eq!(first_pass.items.len(), 1);
        let merged = &first_pass.items[0];

        // Feeding the single merged result back through the stage (as a
        // one-row batch reconstructed from the draft) must not change its
        // quantities or interval: a merge group of one passes through as-is.
        let reconstructed = PlanRow {
            batch_id: merged.origin_batch.clone(),
            row_index: 0,
            work_order_id: merged.id.clone(),
            article_code: merged.article_code.clone(),
            package_type: "box".into(),
            specification: "84mm".into(),
            production_unit: merged.production_unit.clone(),
            feeder_codes: merged.feeder_codes.clone(),
            maker_codes: merged.maker_codes.clone(),
            input_quantity: merged.input_quantity,
            final_quantity: merged.final_quantity,
            planned_start: merged.planned_start,
            planned_end: merged.planned_end,
            validation_status: ValidationStatus::Valid,
            validation_message: None,
        };
        let mut next_id2 = next_id_fn();
        let second_pass = merge_rows(&[reconstructed], &mut next_id2);
        prop_assert_eq!(second_pass.items.len(), 1);
        let reconverged = &second_pass.items[0];
        prop_assert_eq!(reconverged.input_quantity, merged.input_quantity);
        prop_assert_eq!(reconverged.final_quantity, merged.final_quantity);
        prop_assert_eq!(reconverged.planned_start, merged.planned_start);
        prop_assert_eq!(reconverged.planned_end, merged.planned_end);
    }
}
