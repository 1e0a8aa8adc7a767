use chrono::{DateTime, NaiveTime, Timelike, Utc};

use crate::domain::ShiftDef;

const DEFAULT_SHIFTS: &[(&str, (u32, u32), (u32, u32))] = &[
    ("early", (6, 40), (15, 40)),
    ("middle", (15, 40), (0, 0)),
    ("late", (0, 0), (6, 40)),
];

/// Resolves shift boundaries for a machine at a given instant. Most-specific
/// match wins (a shift row naming the machine beats a wildcard row); if no
/// row matches at all, falls back to the three built-in default shifts.
pub struct CalendarService<'a> {
    shifts: &'a [ShiftDef],
}

impl<'a> CalendarService<'a> {
    pub fn new(shifts: &'a [ShiftDef]) -> Self {
        CalendarService { shifts }
    }

    /// Returns the shift covering `at` for `machine_code`, or `None` if it
    /// falls in a gap between defined shifts (callers fall back to
    /// [`Self::default_shift_for`]).
    pub fn shift_covering(&self, machine_code: &str, at: DateTime<Utc>) -> Option<&'a ShiftDef> {
        let t = at.time();
        let mut best: Option<&ShiftDef> = None;
        for shift in self.shifts {
            if !Self::covers(shift.start_time, shift.end_time, t) {
                continue;
            }
            match shift.machine_code.as_deref() {
                Some(code) if code == machine_code => return Some(shift),
                None if best.is_none() => best = Some(shift),
                _ => {}
            }
        }
        best
    }

    fn covers(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
        if start <= end {
            t >= start && t < end
        } else {
            // wraps past midnight
            t >= start || t < end
        }
    }

    /// Default shift (early/middle/late) covering `at`, used when no
    /// `ShiftDef` row matches.
    pub fn default_shift_for(at: DateTime<Utc>) -> (&'static str, u32, u32) {
        let minutes = at.hour() * 60 + at.minute();
        for (name, (sh, sm), (eh, em)) in DEFAULT_SHIFTS {
            let start = sh * 60 + sm;
            let end = if *eh == 0 && *em == 0 { 24 * 60 } else { eh * 60 + em };
            if minutes >= start && minutes < end {
                return (name, *sh, *sm);
            }
        }
        ("late", 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_shift_covers_early_morning() {
        let at = Utc::now().date_naive().and_hms_opt(7, 0, 0).unwrap();
        let at = Utc.from_utc_datetime(&at);
        let (name, _, _) = CalendarService::default_shift_for(at);
        assert_eq!(name, "early");
    }
}
