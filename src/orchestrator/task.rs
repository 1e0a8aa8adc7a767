//! Task state machine and progress accounting, the orchestrator's analogue
//! of the teacher's `task_scheduler::monitor::ProgressMonitor` — metrics are
//! read from a published snapshot rather than live mutable state, per the
//! design-notes REDESIGN FLAG on cooperative polling loops.

use serde::{Deserialize, Serialize};

/// `pending → running → {completed, failed, cancelled}`, per §4.7. All
/// transitions happen through [`crate::orchestrator::Orchestrator`], which
/// persists each one to `aps_task` before the in-memory snapshot is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => TaskState::Running,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            "cancelled" => TaskState::Cancelled,
            _ => TaskState::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

/// Which stages run for a task; a disabled stage is a pass-through. All
/// default to enabled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageOptions {
    pub merge_enabled: bool,
    pub split_enabled: bool,
    pub correction_enabled: bool,
    pub parallel_enabled: bool,
}

impl Default for StageOptions {
    fn default() -> Self {
        StageOptions { merge_enabled: true, split_enabled: true, correction_enabled: true, parallel_enabled: true }
    }
}

/// One pipeline stage's name plus the share of total progress it
/// contributes when it completes (§4.7: parser 15, merge 10, split 10,
/// correction 30, parallel 25, emission 10).
pub const STAGE_WEIGHTS: &[(&str, u8)] = &[
    ("parser", 15),
    ("merge", 10),
    ("split", 10),
    ("correction", 30),
    ("parallel", 25),
    ("emission", 10),
];

/// Aggregate progress (0-100) after completing every stage up to and
/// including `completed_stage` in [`STAGE_WEIGHTS`] order.
pub fn progress_through(completed_stage: &str) -> u8 {
    let mut total: u32 = 0;
    for (name, weight) in STAGE_WEIGHTS {
        total += *weight as u32;
        if *name == completed_stage {
            break;
        }
    }
    total.min(100) as u8
}

/// Published status snapshot, served to the dashboard's task-status view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    pub progress: u8,
    pub current_stage: String,
    pub processed_records: u64,
    pub total_records: u64,
    pub error_message: Option<String>,
    pub manual_review_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_accumulates_stage_weights_in_order() {
        assert_eq!(progress_through("parser"), 15);
        assert_eq!(progress_through("merge"), 25);
        assert_eq!(progress_through("split"), 35);
        assert_eq!(progress_through("correction"), 65);
        assert_eq!(progress_through("parallel"), 90);
        assert_eq!(progress_through("emission"), 100);
    }

    #[test]
    fn terminal_states_are_identified() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
    }

    #[test]
    fn state_round_trips_through_its_string_form() {
        for state in [TaskState::Pending, TaskState::Running, TaskState::Completed, TaskState::Failed, TaskState::Cancelled] {
            assert_eq!(TaskState::from_str(state.as_str()), state);
        }
    }
}
