use std::collections::HashMap;

use chrono::Utc;

use crate::domain::{Diagnostic, DiagnosticKind, PlanRow, WorkOrderDraft};

use super::StageOutcome;

/// §4.2 failure semantics: a merge that would push a summed quantity past
/// this bound is never performed; the group is emitted unmerged with a
/// warning instead.
const MAX_MERGED_QUANTITY: i64 = 1i64 << 31;

/// Union-find over plan rows sharing a merge key. Path compression only;
/// the input sizes here (thousands of rows per batch) never warrant
/// union-by-rank bookkeeping.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

fn merge_key(row: &PlanRow) -> (i32, u32, String, Vec<String>, Vec<String>) {
    let mut makers = row.maker_codes.clone();
    makers.sort();
    let mut feeders = row.feeder_codes.clone();
    feeders.sort();
    (row.planned_start.format("%Y").to_string().parse().unwrap_or(0), row.planned_start.format("%m").to_string().parse().unwrap_or(0), row.article_code.clone(), makers, feeders)
}

/// Groups rows sharing (year, month, article, maker-set, feeder-set) into one
/// merged draft each; a singleton group passes through unchanged. Processing
/// order is deterministic: ascending planned-start, then row-index.
pub fn merge_rows(rows: &[PlanRow], next_id: &mut dyn FnMut() -> String) -> StageOutcome<WorkOrderDraft> {
    let mut ordered: Vec<usize> = (0..rows.len()).collect();
    ordered.sort_by_key(|&i| (rows[i].planned_start, rows[i].row_index));

    let mut uf = UnionFind::new(rows.len());
    let mut key_to_first: HashMap<(i32, u32, String, Vec<String>, Vec<String>), usize> = HashMap::new();
    for &i in &ordered {
        let key = merge_key(&rows[i]);
        match key_to_first.get(&key) {
            Some(&first) => uf.union(first, i),
            None => {
                key_to_first.insert(key, i);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for &i in &ordered {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut group_roots: Vec<usize> = groups.keys().copied().collect();
    group_roots.sort_by_key(|&root| {
        let members = &groups[&root];
        members.iter().map(|&i| rows[i].planned_start).min().unwrap()
    });

    let mut drafts = Vec::with_capacity(group_roots.len());
    let mut diagnostics = Vec::new();
    for root in group_roots {
        let members = &groups[&root];
        if members.len() == 1 {
            drafts.push(draft_from_single(&rows[members[0]], next_id()));
            continue;
        }

        let member_rows: Vec<&PlanRow> = members.iter().map(|&i| &rows[i]).collect();
        match draft_from_merge(&member_rows, next_id()) {
            Some(draft) => drafts.push(draft),
            None => {
                // §4.2 failure semantics: merging would overflow a quantity
                // invariant, so the group is emitted unmerged instead.
                let work_order_ids: Vec<String> = member_rows.iter().map(|r| r.work_order_id.clone()).collect();
                diagnostics.push(Diagnostic::warning(
                    member_rows[0].row_index,
                    "input_quantity",
                    DiagnosticKind::OutOfRange,
                    &work_order_ids.join(","),
                    format!("merge group {} would overflow quantity bounds, emitted unmerged", work_order_ids.join(",")),
                ));
                for row in &member_rows {
                    drafts.push(draft_from_single(row, next_id()));
                }
            }
        }
    }

    StageOutcome { items: drafts, diagnostics }
}

/// Maps one row straight to a draft with no merging, used both for
/// singleton merge groups and by the orchestrator when the merge stage is
/// disabled (a disabled stage is a pass-through, per §4.7).
pub fn draft_from_single(row: &PlanRow, id: String) -> WorkOrderDraft {
    WorkOrderDraft {
        id,
        origin_batch: row.batch_id.clone(),
        lineage: vec![row.work_order_id.clone()],
        transform_history: Vec::new(),
        article_code: row.article_code.clone(),
        maker_code: None,
        maker_codes: row.maker_codes.clone(),
        feeder_code: None,
        feeder_codes: row.feeder_codes.clone(),
        input_quantity: row.input_quantity,
        final_quantity: row.final_quantity,
        planned_start: row.planned_start,
        planned_end: row.planned_end,
        priority: 5,
        production_unit: row.production_unit.clone(),
        validation_status: row.validation_status,
        split_parent: None,
        split_index: None,
        merged_from: Vec::new(),
    }
}

/// Builds the merged draft for a group, or `None` if doing so would push a
/// summed quantity past [`MAX_MERGED_QUANTITY`] (§4.2 failure semantics).
fn draft_from_merge(members: &[&PlanRow], id: String) -> Option<WorkOrderDraft> {
    let earliest = members.iter().min_by_key(|r| r.planned_start).unwrap();
    let start = members.iter().map(|r| r.planned_start).min().unwrap();
    let end = members.iter().map(|r| r.planned_end).max().unwrap();
    let input_sum: i64 = members.iter().map(|r| r.input_quantity).sum();
    let final_sum: i64 = members.iter().map(|r| r.final_quantity).sum();

    if input_sum > MAX_MERGED_QUANTITY || final_sum > MAX_MERGED_QUANTITY {
        return None;
    }

    let mut draft = draft_from_single(earliest, id);
    draft.planned_start = start;
    draft.planned_end = end;
    draft.input_quantity = input_sum;
    draft.final_quantity = final_sum;
    draft.lineage = members.iter().map(|r| r.work_order_id.clone()).collect();
    draft.merged_from = draft.lineage.clone();
    draft.record_transform("merge", earliest.planned_start, earliest.planned_end, format!("merged {} rows", members.len()));
    Some(draft)
}
