//! Drives the five-stage pipeline for one [`crate::domain::ImportBatch`],
//! grounded on the teacher's `task_scheduler::scheduler::TaskScheduler` (a
//! stateful driver coordinating a plan, a progress monitor, and recoverable
//! execution) and the structurally closest external example, a hot-rolling
//! steel APS's `ScheduleOrchestrator` (async, `tracing`-instrumented,
//! composing a fixed sequence of engines).

pub mod task;

pub use task::{progress_through, StageOptions, TaskState, TaskStatus, STAGE_WEIGHTS};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{PlanRow, ValidationStatus, WorkOrder, WorkOrderDraft};
use crate::error::{Error, Result};
use crate::parser::workbook::parse_workbook;
use crate::persistence::{SqliteStore, TaskRow};
use crate::pipeline::{correct_time, draft_from_single, emit_work_orders, merge_rows, split_draft, synchronize};
use crate::reference_data::ReferenceSnapshot;
use crate::sequence::IdAllocator;

/// Rows processed per cooperative-cancellation check inside a stage, per
/// §4.7. The current stage functions run to completion as pure `[Draft] ->
/// [Draft]` transforms rather than fanning out over a worker pool (§5's
/// partitioned fan-out is not yet implemented), so in practice cancellation
/// is observed at stage boundaries; this constant documents the intended
/// finer-grained check point for when that fan-out lands.
pub const CANCELLATION_CHUNK_SIZE: usize = 1000;

/// Default per-task timeout, per §5: "default task timeout is 1 hour
/// (configurable per batch)". [`Orchestrator::start`] uses this; callers
/// that need a different bound for one batch use
/// [`Orchestrator::start_with_timeout`].
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(3600);

struct TaskEntry {
    status: TaskStatus,
    cancel_requested: bool,
    started_at: Instant,
    timeout: Duration,
}

/// Coordinates the pipeline, the id allocator, reference data, and
/// persistence for every task the service is asked to run. One orchestrator
/// instance is shared across all tasks; each `start` call registers a new
/// task and runs it to completion (or cancellation) before returning its id
/// — callers poll `status` for progress, matching the cooperative,
/// one-task-at-a-time scheduling model in §5.
pub struct Orchestrator {
    store: Arc<Mutex<SqliteStore>>,
    allocator: Arc<IdAllocator>,
    reference: Arc<ReferenceSnapshot>,
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
}

impl Orchestrator {
    pub fn new(store: SqliteStore, allocator: IdAllocator, reference: ReferenceSnapshot) -> Self {
        Orchestrator {
            store: Arc::new(Mutex::new(store)),
            allocator: Arc::new(allocator),
            reference: Arc::new(reference),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Parses `workbook_path` into a new [`crate::domain::ImportBatch`] and
    /// runs the pipeline against it. Returns the generated `task_id`
    /// immediately after the run completes — structural parse failures
    /// (unreadable workbook, duplicate content digest) are returned here
    /// rather than surfacing only through `status`, since no task is
    /// created for them (§7: input-structural errors fail the upload, no
    /// batch persisted).
    pub fn start(&self, workbook_path: &std::path::Path, cadence: crate::domain::Cadence, options: StageOptions) -> Result<String> {
        self.start_with_timeout(workbook_path, cadence, options, DEFAULT_TASK_TIMEOUT)
    }

    /// Same as [`Orchestrator::start`] with an explicit per-batch timeout
    /// override (§5: "configurable per batch") instead of
    /// [`DEFAULT_TASK_TIMEOUT`].
    pub fn start_with_timeout(
        &self,
        workbook_path: &std::path::Path,
        cadence: crate::domain::Cadence,
        options: StageOptions,
        timeout: Duration,
    ) -> Result<String> {
        let (batch, outcome) = parse_workbook(workbook_path, cadence)?;

        {
            let store = self.store.lock().unwrap();
            if let Some(existing) = store.find_batch_by_digest(&batch.content_digest)? {
                return Err(Error::DuplicateUpload(existing.id));
            }
        }

        let task_id = format!("task_{}", Uuid::new_v4());
        let total_records = outcome.rows.len() as u64;

        {
            let mut store = self.store.lock().unwrap();
            store.save_import_batch(&batch)?;
            store.save_plan_rows(&outcome.rows)?;
            store.save_task(&TaskRow {
                task_id: task_id.clone(),
                batch_id: batch.id.clone(),
                state: TaskState::Pending.as_str().to_string(),
                progress: 0,
                current_stage: "pending".to_string(),
                processed_records: 0,
                total_records,
                started_at: chrono::Utc::now(),
                finished_at: None,
                options_json: serde_json::to_string(&options)?,
                error_message: None,
                result_summary_json: None,
            })?;
        }

        self.tasks.lock().unwrap().insert(
            task_id.clone(),
            TaskEntry {
                status: TaskStatus {
                    task_id: task_id.clone(),
                    state: TaskState::Pending,
                    progress: 0,
                    current_stage: "pending".to_string(),
                    processed_records: 0,
                    total_records,
                    error_message: None,
                    manual_review_ids: Vec::new(),
                },
                cancel_requested: false,
                started_at: Instant::now(),
                timeout,
            },
        );

        self.execute_start(&task_id, outcome.rows, options);
        Ok(task_id)
    }

    /// Retries a failed task, resuming from the last successfully persisted
    /// checkpoint rather than re-running the parser. A task cancelled by
    /// the user is not retried automatically (§4.7); callers must call
    /// `start` again with a fresh batch.
    pub fn retry(&self, task_id: &str, options: StageOptions) -> Result<()> {
        let stage = {
            let store = self.store.lock().unwrap();
            let task = store.get_task(task_id)?.ok_or_else(|| Error::NotFound(task_id.to_string()))?;
            if TaskState::from_str(&task.state) != TaskState::Failed {
                return Err(Error::InvalidStateTransition(format!("task {task_id} is not in a failed state")));
            }
            store.latest_checkpoint_stage(task_id)?
        };

        let Some(stage) = stage else {
            return Err(Error::InvalidStateTransition(format!("task {task_id} has no checkpoint to resume from")));
        };

        let drafts_json = {
            let store = self.store.lock().unwrap();
            store.load_checkpoint(task_id, &stage)?.ok_or_else(|| Error::NotFound(format!("checkpoint for task {task_id} at {stage}")))?
        };
        let drafts: Vec<WorkOrderDraft> = serde_json::from_str(&drafts_json)?;

        {
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(entry) = tasks.get_mut(task_id) {
                entry.started_at = Instant::now();
                entry.cancel_requested = false;
            }
        }

        info!(task_id, resume_stage = %stage, "retrying task from last checkpoint");
        self.execute(task_id, &stage, drafts, options);
        Ok(())
    }

    pub fn status(&self, task_id: &str) -> Result<TaskStatus> {
        let tasks = self.tasks.lock().unwrap();
        tasks.get(task_id).map(|entry| entry.status.clone()).ok_or_else(|| Error::NotFound(task_id.to_string()))
    }

    /// Requests cancellation. Observed at the next stage boundary; a task
    /// that has already reached a terminal state is left untouched.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.get_mut(task_id).ok_or_else(|| Error::NotFound(task_id.to_string()))?;
        if entry.status.state.is_terminal() {
            return Err(Error::InvalidStateTransition(format!("task {task_id} already in terminal state {:?}", entry.status.state)));
        }
        entry.cancel_requested = true;
        Ok(())
    }

    /// Runs the pipeline from the parser's rows to completion, swallowing
    /// any non-structural failure into a `Failed` task transition instead of
    /// propagating it — once a task is registered, only genuine caller
    /// errors (bad task id, invalid state transition) surface as an `Err`
    /// from the public API; a pipeline failure is a normal terminal outcome
    /// read back via `status`.
    fn execute_start(&self, task_id: &str, rows: Vec<PlanRow>, options: StageOptions) {
        match self.run_from_rows(task_id, rows, options) {
            Ok(()) | Err(Error::Cancelled) | Err(Error::Timeout(_)) => {}
            Err(e) => {
                warn!(task_id, error = %e, "task failed");
                let _ = self.mark_failed(task_id, &e);
            }
        }
    }

    /// Resumes the pipeline from a checkpointed stage, with the same
    /// error-swallowing contract as [`Orchestrator::execute_start`].
    fn execute(&self, task_id: &str, from_stage: &str, drafts: Vec<WorkOrderDraft>, options: StageOptions) {
        match self.run_remaining(task_id, from_stage, drafts, options) {
            Ok(()) | Err(Error::Cancelled) | Err(Error::Timeout(_)) => {}
            Err(e) => {
                warn!(task_id, error = %e, "task failed");
                let _ = self.mark_failed(task_id, &e);
            }
        }
    }

    /// Converts the parser's rows into drafts via the merge stage (§4.2),
    /// then hands off to [`Orchestrator::run_remaining`] for split onward.
    /// A disabled merge stage still performs the row-to-draft conversion
    /// (every row becomes its own singleton draft) since later stages
    /// operate on `WorkOrderDraft`, not `PlanRow` — "pass-through" here
    /// means skip grouping, not skip the type.
    fn run_from_rows(&self, task_id: &str, rows: Vec<PlanRow>, options: StageOptions) -> Result<()> {
        let consumable: Vec<PlanRow> = rows.into_iter().filter(|r| r.is_consumable()).collect();
        self.transition(task_id, TaskState::Running, "merge", consumable.len() as u64)?;

        self.check_boundary(task_id, "merge", consumable.len() as u64)?;

        debug!(task_id, stage = "merge", enabled = options.merge_enabled, row_count = consumable.len(), "entering stage");
        let mut counter = 0u64;
        let drafts = if options.merge_enabled {
            let outcome = merge_rows(&consumable, &mut || {
                counter += 1;
                format!("merged-{counter}")
            });
            for d in &outcome.diagnostics {
                warn!(task_id, message = %d.message, "diagnostic raised during merge");
            }
            outcome.items
        } else {
            consumable
                .iter()
                .map(|row| {
                    counter += 1;
                    draft_from_single(row, format!("merged-{counter}"))
                })
                .collect()
        };

        self.checkpoint(task_id, "merge", &drafts)?;
        self.publish_progress(task_id, "merge", drafts.len() as u64)?;

        self.run_remaining(task_id, "merge", drafts, options)
    }

    /// Runs every stage from `from_stage` (exclusive, i.e. resuming
    /// immediately after it) through emission, persisting a checkpoint after
    /// each stage and publishing status as it goes. Returns
    /// `Err(Error::Cancelled)` once a cancellation request is observed —
    /// the `Cancelled` task transition has already been persisted by the
    /// time this returns.
    fn run_remaining(&self, task_id: &str, from_stage: &str, mut drafts: Vec<WorkOrderDraft>, options: StageOptions) -> Result<()> {
        self.transition(task_id, TaskState::Running, from_stage, drafts.len() as u64)?;

        let reference = self.reference.current();
        let mut manual_review_ids = Vec::new();

        let stages: &[(&str, bool)] = &[("split", options.split_enabled), ("correction", options.correction_enabled), ("parallel", options.parallel_enabled)];

        let started = stages.iter().position(|(name, _)| *name == from_stage).map(|i| i + 1).unwrap_or(0);

        for (name, enabled) in stages.iter().skip(started) {
            self.check_boundary(task_id, name, drafts.len() as u64)?;

            debug!(task_id, stage = name, enabled, draft_count = drafts.len(), "entering stage");
            if *enabled {
                drafts = self.run_stage(name, drafts, &reference, &mut manual_review_ids)?;
            }
            self.checkpoint(task_id, name, &drafts)?;
            self.publish_progress(task_id, name, drafts.len() as u64)?;
        }

        self.check_boundary(task_id, "emission", drafts.len() as u64)?;

        info!(task_id, draft_count = drafts.len(), "emitting work orders");
        let outcome = emit_work_orders(drafts, &reference, &self.allocator)?;
        for d in &outcome.diagnostics {
            warn!(task_id, message = %d.message, "diagnostic raised during emission");
        }

        {
            let mut store = self.store.lock().unwrap();
            store.save_work_orders(&outcome.items)?;
        }

        self.publish_progress(task_id, "emission", outcome.items.len() as u64)?;
        self.finish(task_id, manual_review_ids)
    }

    fn run_stage(
        &self,
        name: &str,
        drafts: Vec<WorkOrderDraft>,
        reference: &crate::reference_data::ReferenceData,
        manual_review_ids: &mut Vec<String>,
    ) -> Result<Vec<WorkOrderDraft>> {
        match name {
            "split" => {
                let mut out = Vec::with_capacity(drafts.len());
                for draft in &drafts {
                    out.extend(split_draft(draft, reference).items);
                }
                Ok(out)
            }
            "correction" => {
                let mut out = Vec::with_capacity(drafts.len());
                for draft in drafts {
                    let outcome = correct_time(draft, reference);
                    for item in &outcome.items {
                        if item.validation_status == ValidationStatus::ManualReview {
                            manual_review_ids.push(item.id.clone());
                        }
                    }
                    out.extend(outcome.items);
                }
                Ok(out)
            }
            "parallel" => {
                let outcome = synchronize(drafts, reference);
                for item in &outcome.items {
                    if item.validation_status == ValidationStatus::ManualReview {
                        manual_review_ids.push(item.id.clone());
                    }
                }
                Ok(outcome.items)
            }
            other => Err(Error::Internal(format!("unknown pipeline stage {other}"))),
        }
    }

    fn check_cancelled(&self, task_id: &str) -> Result<bool> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.get(task_id).map(|e| e.cancel_requested).unwrap_or(false))
    }

    /// Elapsed time since the task started if it has exceeded its
    /// configured timeout, else `None`.
    fn check_timeout(&self, task_id: &str) -> Option<Duration> {
        let tasks = self.tasks.lock().unwrap();
        tasks.get(task_id).and_then(|e| {
            let elapsed = e.started_at.elapsed();
            if elapsed >= e.timeout {
                Some(elapsed)
            } else {
                None
            }
        })
    }

    /// Cooperative stage-boundary check (§4.7, §5): a timed-out task fails
    /// with `Error::Timeout` and a persisted `Failed` transition; a
    /// cancelled task transitions to `Cancelled`. Both return
    /// `Err` so the caller's stage loop stops immediately.
    fn check_boundary(&self, task_id: &str, stage: &str, processed: u64) -> Result<()> {
        if let Some(elapsed) = self.check_timeout(task_id) {
            let err = Error::Timeout(elapsed);
            warn!(task_id, stage, elapsed = ?elapsed, "task exceeded its configured timeout");
            self.mark_failed(task_id, &err)?;
            return Err(err);
        }
        if self.check_cancelled(task_id)? {
            self.transition(task_id, TaskState::Cancelled, stage, processed)?;
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn checkpoint(&self, task_id: &str, stage: &str, drafts: &[WorkOrderDraft]) -> Result<()> {
        let json = serde_json::to_string(drafts)?;
        let store = self.store.lock().unwrap();
        store.save_checkpoint(task_id, stage, &json)
    }

    fn publish_progress(&self, task_id: &str, stage: &str, processed: u64) -> Result<()> {
        let progress = progress_through(stage);
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(entry) = tasks.get_mut(task_id) {
            entry.status.current_stage = stage.to_string();
            entry.status.progress = progress;
            entry.status.processed_records = processed;
        }
        let store = self.store.lock().unwrap();
        if let Some(mut row) = store.get_task(task_id)? {
            row.progress = progress;
            row.current_stage = stage.to_string();
            row.processed_records = processed;
            store.save_task(&row)?;
        }
        Ok(())
    }

    /// Persists `state` to both the in-memory snapshot and `aps_task`.
    /// Always succeeds in transitioning (never raises `Error::Cancelled` or
    /// similar on the caller's behalf) — callers that need cancellation to
    /// short-circuit the pipeline return `Err(Error::Cancelled)` themselves
    /// right after calling this.
    fn transition(&self, task_id: &str, state: TaskState, stage: &str, processed: u64) -> Result<()> {
        info!(task_id, ?state, stage, "task state transition");
        {
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(entry) = tasks.get_mut(task_id) {
                entry.status.state = state;
                entry.status.current_stage = stage.to_string();
            }
        }
        let store = self.store.lock().unwrap();
        if let Some(mut row) = store.get_task(task_id)? {
            row.state = state.as_str().to_string();
            row.current_stage = stage.to_string();
            row.processed_records = processed;
            if state.is_terminal() {
                row.finished_at = Some(chrono::Utc::now());
            }
            store.save_task(&row)?;
        }
        Ok(())
    }

    /// Persists a `Failed` transition with `error`'s message recorded, for
    /// errors that reached `execute` without already having transitioned the
    /// task themselves (anything other than `Error::Cancelled`).
    fn mark_failed(&self, task_id: &str, error: &Error) -> Result<()> {
        let message = error.to_string();
        {
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(entry) = tasks.get_mut(task_id) {
                entry.status.state = TaskState::Failed;
                entry.status.current_stage = "failed".to_string();
                entry.status.error_message = Some(message.clone());
            }
        }
        let store = self.store.lock().unwrap();
        if let Some(mut row) = store.get_task(task_id)? {
            row.state = TaskState::Failed.as_str().to_string();
            row.current_stage = "failed".to_string();
            row.finished_at = Some(chrono::Utc::now());
            row.error_message = Some(message);
            store.save_task(&row)?;
        }
        Ok(())
    }

    fn finish(&self, task_id: &str, manual_review_ids: Vec<String>) -> Result<()> {
        {
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(entry) = tasks.get_mut(task_id) {
                entry.status.state = TaskState::Completed;
                entry.status.progress = 100;
                entry.status.current_stage = "completed".to_string();
                entry.status.manual_review_ids = manual_review_ids.clone();
            }
        }
        let store = self.store.lock().unwrap();
        if let Some(mut row) = store.get_task(task_id)? {
            row.state = TaskState::Completed.as_str().to_string();
            row.progress = 100;
            row.current_stage = "completed".to_string();
            row.finished_at = Some(chrono::Utc::now());
            row.result_summary_json = Some(serde_json::to_string(&manual_review_ids)?);
            store.save_task(&row)?;
        }
        Ok(())
    }
}
