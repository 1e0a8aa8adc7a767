use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};

use crate::domain::{Diagnostic, DiagnosticKind, ShiftDef, ValidationStatus, WorkOrderDraft};
use crate::reference_data::{CalendarService, MaintenanceService, ReferenceData, SpeedService};

use super::StageOutcome;

/// Bound on conflict-resolution iterations per §4.4; an order that still has
/// an unresolved maintenance conflict after this many passes is escalated to
/// `manual-review` rather than looped on forever.
const MAX_ITERATIONS: u32 = 16;

fn required_duration(draft: &WorkOrderDraft, speed: &SpeedService<'_>) -> Duration {
    let maker = draft.maker_code.as_deref().unwrap_or_default();
    let (rate, efficiency) = speed.rate_for(maker, &draft.article_code);
    draft.required_duration(rate, efficiency)
}

fn at_time(dt: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&dt.date_naive().and_time(time))
}

/// Resolves one maintenance conflict per §4.4 step 1. Returns the rewritten
/// draft, an optional remainder (when the resolution policy truncates time
/// that must be rescheduled), and whether any conflict was found at all.
fn resolve_one_conflict(
    mut draft: WorkOrderDraft,
    maintenance: &MaintenanceService<'_>,
    required: Duration,
) -> (WorkOrderDraft, Option<WorkOrderDraft>, bool) {
    let maker = draft.maker_code.clone().unwrap_or_default();
    let windows = maintenance.overlapping(&maker, draft.planned_start, draft.planned_end);
    let Some(w) = windows.first().copied() else {
        return (draft, None, false);
    };

    let (s, e) = (draft.planned_start, draft.planned_end);
    let mut remainder = None;

    let original_duration = e - s;

    if w.start <= s && e <= w.end {
        // window fully contains the order
        draft.planned_start = w.end;
        draft.planned_end = w.end + original_duration;
        draft.record_transform("time_correction", s, e, format!("maintenance window {}..{} fully contains order, shifted to start after it", w.start, w.end));
    } else if s < w.start && w.start < e && e <= w.end {
        // window starts inside the order
        let available = w.start - s;
        draft.planned_end = w.start;
        if available < required {
            let mut rem = draft.clone();
            rem.id = format!("{}-rem", draft.id);
            rem.planned_start = w.end;
            rem.planned_end = w.end + (required - available);
            rem.record_transform("time_correction", s, e, "maintenance-split remainder: not enough time before window start");
            remainder = Some(rem);
        }
        draft.record_transform("time_correction", s, e, format!("truncated end to {} before maintenance window", w.start));
    } else if w.start <= s && s < w.end && w.end < e {
        // window ends inside the order
        draft.planned_start = w.end;
        draft.planned_end = w.end + original_duration;
        draft.record_transform("time_correction", s, e, format!("shifted start to {} after maintenance window end", w.end));
    } else if s < w.start && w.end < e {
        // window strictly inside the order: default policy splits a remainder after it
        let before_window = w.start - s;
        draft.planned_end = w.start;
        let mut rem = draft.clone();
        rem.id = format!("{}-rem", draft.id);
        rem.planned_start = w.end;
        rem.planned_end = w.end + (required - before_window).max(Duration::zero());
        rem.record_transform("time_correction", s, e, "maintenance-split remainder: window strictly inside order");
        remainder = Some(rem);
        draft.record_transform("time_correction", s, e, format!("truncated to {} by interior maintenance window", w.start));
    }

    (draft, remainder, true)
}

/// Resolves all maintenance conflicts for `draft`, iterating up to
/// [`MAX_ITERATIONS`] times. Returns the resolved draft(s) plus whether the
/// bound was hit with a conflict still outstanding.
fn resolve_maintenance(mut draft: WorkOrderDraft, maintenance: &MaintenanceService<'_>, required: Duration) -> (Vec<WorkOrderDraft>, bool) {
    let mut remainders = Vec::new();
    let mut unresolved = false;

    for _ in 0..MAX_ITERATIONS {
        let (next, remainder, had_conflict) = resolve_one_conflict(draft, maintenance, required);
        draft = next;
        if let Some(r) = remainder {
            remainders.push(r);
        }
        if !had_conflict {
            unresolved = false;
            let mut all = vec![draft];
            all.extend(remainders);
            return (all, unresolved);
        }
    }

    // Bound exhausted; check once more whether a conflict remains.
    let maker = draft.maker_code.clone().unwrap_or_default();
    unresolved = !maintenance.overlapping(&maker, draft.planned_start, draft.planned_end).is_empty();
    let mut all = vec![draft];
    all.extend(remainders);
    (all, unresolved)
}

/// Finds the shift that applies to `maker` at `at`: most-specific [`ShiftDef`]
/// row if one matches, else the built-in early/middle/late default.
fn shift_window(calendar: &CalendarService<'_>, shifts: &[ShiftDef], maker: &str, at: DateTime<Utc>) -> (NaiveTime, NaiveTime, bool) {
    if let Some(shift) = calendar.shift_covering(maker, at) {
        return (shift.start_time, shift.end_time, true);
    }
    if shifts.is_empty() {
        let (_, sh, sm) = CalendarService::default_shift_for(at);
        let start = NaiveTime::from_hms_opt(sh, sm, 0).unwrap();
        // default shifts tile the full day contiguously; derive this shift's
        // end as the next default boundary.
        let end = match (sh, sm) {
            (6, 40) => NaiveTime::from_hms_opt(15, 40, 0).unwrap(),
            (15, 40) => NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            _ => NaiveTime::from_hms_opt(6, 40, 0).unwrap(),
        };
        return (start, end, true);
    }
    // no row covers `at`: find the next shift (for this machine or wildcard)
    // starting after `at`'s time-of-day, projecting forward onto its start.
    let t = at.time();
    let mut candidates: Vec<&ShiftDef> = shifts.iter().filter(|s| s.machine_code.as_deref().map_or(true, |c| c == maker)).collect();
    candidates.sort_by_key(|s| s.start_time);
    for s in &candidates {
        if s.start_time > t {
            return (s.start_time, s.end_time, false);
        }
    }
    if let Some(first) = candidates.first() {
        return (first.start_time, first.end_time, false);
    }
    (t, t, true)
}

/// Projects `draft`'s start onto the next shift boundary if it falls outside
/// any defined shift, then checks whether the required interval crosses into
/// a non-contiguous shift; if it does, truncates at the shift end and
/// returns a remainder for what's left.
fn apply_shift_boundaries(
    mut draft: WorkOrderDraft,
    calendar: &CalendarService<'_>,
    shifts: &[ShiftDef],
    required: Duration,
) -> (WorkOrderDraft, Option<WorkOrderDraft>) {
    let maker = draft.maker_code.clone().unwrap_or_default();
    let (start_time, end_time, covered) = shift_window(calendar, shifts, &maker, draft.planned_start);

    if !covered {
        let before_s = draft.planned_start;
        let before_e = draft.planned_end;
        draft.planned_start = at_time(draft.planned_start, start_time);
        draft.planned_end = draft.planned_start + required;
        draft.record_transform("time_correction", before_s, before_e, "projected onto next shift boundary");
    }

    // end-of-shift boundary for the (possibly re-projected) start
    let shift_end = if end_time == NaiveTime::from_hms_opt(0, 0, 0).unwrap() {
        at_time(draft.planned_start, end_time) + Duration::days(1)
    } else {
        at_time(draft.planned_start, end_time)
    };

    if draft.planned_end > shift_end {
        // crossing past this shift's end; the default shifts tile the day
        // contiguously so only custom, gapped ShiftDef rows produce a cut.
        let is_default = shifts.is_empty();
        if !is_default {
            let before_s = draft.planned_start;
            let before_e = draft.planned_end;
            let remainder_len = draft.planned_end - shift_end;
            draft.planned_end = shift_end;
            draft.record_transform("time_correction", before_s, before_e, "cut at non-contiguous shift boundary");

            let mut rem = draft.clone();
            rem.id = format!("{}-rem2", draft.id);
            rem.planned_start = shift_end;
            rem.planned_end = shift_end + remainder_len;
            rem.record_transform("time_correction", before_s, before_e, "remainder after shift-boundary cut");
            return (draft, Some(rem));
        }
    }

    (draft, None)
}

/// Runs one draft through §4.4: extends its interval to the required
/// duration, resolves maintenance conflicts (bounded, §4.4 step 1), then
/// projects onto shift boundaries and cuts at non-contiguous shift ends
/// (steps 2–3). Orders that still conflict after the iteration bound are
/// marked `manual-review` with a diagnostic rather than dropped.
pub fn correct_time(draft: WorkOrderDraft, reference: &ReferenceData) -> StageOutcome<WorkOrderDraft> {
    let speed = SpeedService::new(&reference.speed_rules);
    let maintenance = MaintenanceService::new(&reference.maintenance_windows);
    let calendar = CalendarService::new(&reference.shifts);

    let required = required_duration(&draft, &speed);

    let mut draft = draft;
    if draft.planned_end - draft.planned_start < required {
        let before_s = draft.planned_start;
        let before_e = draft.planned_end;
        draft.planned_end = draft.planned_start + required;
        draft.record_transform("time_correction", before_s, before_e, "extended interval to required duration");
    }

    let (resolved, unresolved) = resolve_maintenance(draft, &maintenance, required);

    let mut diagnostics = Vec::new();
    let mut output = Vec::with_capacity(resolved.len());
    for mut d in resolved {
        if unresolved && d.split_parent.is_none() {
            d.validation_status = ValidationStatus::ManualReview;
            diagnostics.push(Diagnostic::warning(
                0,
                "maintenance",
                DiagnosticKind::OutOfRange,
                &d.id,
                format!("order {} could not clear maintenance conflicts within {MAX_ITERATIONS} iterations", d.id),
            ));
            output.push(d);
            continue;
        }
        let (boundary_fixed, maybe_remainder) = apply_shift_boundaries(d, &calendar, &reference.shifts, required);
        output.push(boundary_fixed);
        if let Some(r) = maybe_remainder {
            output.push(r);
        }
    }

    StageOutcome { items: output, diagnostics }
}
