use chrono::{DateTime, Utc};

use crate::domain::MaintenanceWindow;

/// Looks up maintenance downtime for a machine over an interval. Missing
/// maintenance data for a machine is not an error: callers treat an empty
/// result as "no maintenance", the conservative default named in the error
/// taxonomy's reference-data category.
pub struct MaintenanceService<'a> {
    windows: &'a [MaintenanceWindow],
}

impl<'a> MaintenanceService<'a> {
    pub fn new(windows: &'a [MaintenanceWindow]) -> Self {
        MaintenanceService { windows }
    }

    /// Windows for `machine_code` overlapping `[start, end]`, sorted by start.
    pub fn overlapping(&self, machine_code: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&'a MaintenanceWindow> {
        let mut hits: Vec<&MaintenanceWindow> = self
            .windows
            .iter()
            .filter(|w| w.machine_code == machine_code && w.start < end && w.end > start)
            .collect();
        hits.sort_by_key(|w| w.start);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window(start_offset_h: i64, end_offset_h: i64) -> MaintenanceWindow {
        let base = Utc::now();
        MaintenanceWindow {
            machine_code: "M1".into(),
            start: base + Duration::hours(start_offset_h),
            end: base + Duration::hours(end_offset_h),
            status: "scheduled".into(),
        }
    }

    #[test]
    fn overlapping_filters_by_machine_and_interval() {
        let windows = vec![window(0, 2), window(10, 12)];
        let svc = MaintenanceService::new(&windows);
        let base = Utc::now();
        let hits = svc.overlapping("M1", base - Duration::hours(1), base + Duration::hours(1));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_returns_empty_for_unknown_machine() {
        let windows = vec![window(0, 2)];
        let svc = MaintenanceService::new(&windows);
        let base = Utc::now();
        assert!(svc.overlapping("M2", base, base + Duration::hours(2)).is_empty());
    }
}
