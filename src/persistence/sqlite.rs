use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{
    Cadence, ImportBatch, ImportBatchState, Machine, MachineKind, MachineRelation, MaintenanceWindow, PlanRow, ShiftDef, SpeedRule,
    ValidationStatus, WorkOrder,
};
use crate::error::{Error, Result};
use crate::reference_data::ReferenceData;

fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn str_to_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).map_err(|e| Error::Persistence(e.to_string()))
}

fn cadence_to_str(c: Cadence) -> &'static str {
    match c {
        Cadence::Decade => "decade",
        Cadence::Monthly => "monthly",
    }
}

fn cadence_from_str(s: &str) -> Cadence {
    match s {
        "monthly" => Cadence::Monthly,
        _ => Cadence::Decade,
    }
}

fn batch_state_to_str(s: ImportBatchState) -> &'static str {
    match s {
        ImportBatchState::Uploading => "uploading",
        ImportBatchState::Parsing => "parsing",
        ImportBatchState::Completed => "completed",
        ImportBatchState::Failed => "failed",
    }
}

fn batch_state_from_str(s: &str) -> ImportBatchState {
    match s {
        "parsing" => ImportBatchState::Parsing,
        "completed" => ImportBatchState::Completed,
        "failed" => ImportBatchState::Failed,
        _ => ImportBatchState::Uploading,
    }
}

fn validation_status_to_str(s: ValidationStatus) -> &'static str {
    match s {
        ValidationStatus::Valid => "valid",
        ValidationStatus::Warning => "warning",
        ValidationStatus::Error => "error",
        ValidationStatus::ManualReview => "manual_review",
    }
}

fn validation_status_from_str(s: &str) -> ValidationStatus {
    match s {
        "warning" => ValidationStatus::Warning,
        "error" => ValidationStatus::Error,
        "manual_review" => ValidationStatus::ManualReview,
        _ => ValidationStatus::Valid,
    }
}

fn machine_kind_to_str(k: MachineKind) -> &'static str {
    match k {
        MachineKind::Maker => "maker",
        MachineKind::Feeder => "feeder",
    }
}

fn machine_kind_from_str(s: &str) -> MachineKind {
    match s {
        "feeder" => MachineKind::Feeder,
        _ => MachineKind::Maker,
    }
}

/// A persisted orchestrator task row (see `aps_task`). The orchestrator owns
/// the state machine; this is its at-rest representation.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub task_id: String,
    pub batch_id: String,
    pub state: String,
    pub progress: u8,
    pub current_stage: String,
    pub processed_records: u64,
    pub total_records: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub options_json: String,
    pub error_message: Option<String>,
    pub result_summary_json: Option<String>,
}

/// Single SQLite connection backing every `aps_*` table.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS aps_import_batch (
                id TEXT PRIMARY KEY,
                cadence TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size_bytes INTEGER NOT NULL,
                content_digest TEXT NOT NULL,
                state TEXT NOT NULL,
                total_rows INTEGER NOT NULL,
                valid_rows INTEGER NOT NULL,
                warning_rows INTEGER NOT NULL,
                error_rows INTEGER NOT NULL,
                uploaded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_import_batch_digest ON aps_import_batch(content_digest);

            CREATE TABLE IF NOT EXISTS aps_plan_row (
                batch_id TEXT NOT NULL,
                row_index INTEGER NOT NULL,
                work_order_id TEXT NOT NULL,
                article_code TEXT NOT NULL,
                package_type TEXT NOT NULL,
                specification TEXT NOT NULL,
                production_unit TEXT NOT NULL,
                feeder_codes TEXT NOT NULL,
                maker_codes TEXT NOT NULL,
                input_quantity INTEGER NOT NULL,
                final_quantity INTEGER NOT NULL,
                planned_start TEXT NOT NULL,
                planned_end TEXT NOT NULL,
                validation_status TEXT NOT NULL,
                validation_message TEXT,
                PRIMARY KEY (batch_id, row_index)
            );

            CREATE TABLE IF NOT EXISTS aps_task (
                task_id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                state TEXT NOT NULL,
                progress INTEGER NOT NULL,
                current_stage TEXT NOT NULL,
                processed_records INTEGER NOT NULL,
                total_records INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                options_json TEXT NOT NULL,
                error_message TEXT,
                result_summary_json TEXT
            );

            CREATE TABLE IF NOT EXISTS aps_work_order_maker (
                id TEXT PRIMARY KEY,
                maker_code TEXT NOT NULL,
                article_code TEXT NOT NULL,
                input_quantity INTEGER NOT NULL,
                final_quantity INTEGER NOT NULL,
                planned_start TEXT NOT NULL,
                planned_end TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                plan_date TEXT NOT NULL,
                related_feeder_order TEXT,
                is_backup INTEGER NOT NULL,
                backup_reason TEXT,
                split_from TEXT,
                split_index INTEGER,
                merged_from TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aps_work_order_feeder (
                id TEXT PRIMARY KEY,
                feeder_code TEXT NOT NULL,
                article_code TEXT NOT NULL,
                total_quantity INTEGER NOT NULL,
                planned_start TEXT NOT NULL,
                planned_end TEXT NOT NULL,
                plan_date TEXT NOT NULL,
                related_maker_orders TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aps_machine (
                code TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                equipment_model TEXT NOT NULL,
                active INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aps_machine_relation (
                feeder_code TEXT NOT NULL,
                maker_code TEXT NOT NULL,
                priority INTEGER NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT,
                changeover_override_minutes INTEGER,
                PRIMARY KEY (feeder_code, maker_code)
            );

            CREATE TABLE IF NOT EXISTS aps_machine_speed (
                machine_code TEXT,
                article_code TEXT,
                rate_boxes_per_hour REAL NOT NULL,
                efficiency REAL NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT
            );

            CREATE TABLE IF NOT EXISTS aps_shift_config (
                shift_name TEXT NOT NULL,
                machine_code TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                overtime_allowed INTEGER NOT NULL,
                max_overtime_minutes INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aps_maintenance_window (
                machine_code TEXT NOT NULL,
                start TEXT NOT NULL,
                end TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS aps_task_checkpoint (
                task_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                drafts_json TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                PRIMARY KEY (task_id, stage)
            );",
        )?;
        Ok(())
    }

    // -- import batches --------------------------------------------------

    pub fn save_import_batch(&self, batch: &ImportBatch) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO aps_import_batch
                (id, cadence, file_name, file_size_bytes, content_digest, state, total_rows, valid_rows, warning_rows, error_rows, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                batch.id,
                cadence_to_str(batch.cadence),
                batch.file_name,
                batch.file_size_bytes,
                batch.content_digest,
                batch_state_to_str(batch.state),
                batch.total_rows,
                batch.valid_rows,
                batch.warning_rows,
                batch.error_rows,
                dt_to_str(batch.uploaded_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_batch_by_digest(&self, digest: &str) -> Result<Option<ImportBatch>> {
        self.conn
            .query_row(
                "SELECT id, cadence, file_name, file_size_bytes, content_digest, state, total_rows, valid_rows, warning_rows, error_rows, uploaded_at
                 FROM aps_import_batch WHERE content_digest = ?1",
                params![digest],
                Self::row_to_batch,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn get_import_batch(&self, id: &str) -> Result<Option<ImportBatch>> {
        self.conn
            .query_row(
                "SELECT id, cadence, file_name, file_size_bytes, content_digest, state, total_rows, valid_rows, warning_rows, error_rows, uploaded_at
                 FROM aps_import_batch WHERE id = ?1",
                params![id],
                Self::row_to_batch,
            )
            .optional()
            .map_err(Error::from)
    }

    fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<ImportBatch> {
        Ok(ImportBatch {
            id: row.get(0)?,
            cadence: cadence_from_str(&row.get::<_, String>(1)?),
            file_name: row.get(2)?,
            file_size_bytes: row.get(3)?,
            content_digest: row.get(4)?,
            state: batch_state_from_str(&row.get::<_, String>(5)?),
            total_rows: row.get(6)?,
            valid_rows: row.get(7)?,
            warning_rows: row.get(8)?,
            error_rows: row.get(9)?,
            uploaded_at: str_to_dt(&row.get::<_, String>(10)?).unwrap_or_else(|_| Utc::now()),
        })
    }

    // -- plan rows ---------------------------------------------------------

    pub fn save_plan_rows(&mut self, rows: &[PlanRow]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO aps_plan_row
                    (batch_id, row_index, work_order_id, article_code, package_type, specification, production_unit,
                     feeder_codes, maker_codes, input_quantity, final_quantity, planned_start, planned_end,
                     validation_status, validation_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    row.batch_id,
                    row.row_index,
                    row.work_order_id,
                    row.article_code,
                    row.package_type,
                    row.specification,
                    row.production_unit,
                    serde_json::to_string(&row.feeder_codes)?,
                    serde_json::to_string(&row.maker_codes)?,
                    row.input_quantity,
                    row.final_quantity,
                    dt_to_str(row.planned_start),
                    dt_to_str(row.planned_end),
                    validation_status_to_str(row.validation_status),
                    row.validation_message,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_plan_rows(&self, batch_id: &str) -> Result<Vec<PlanRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT batch_id, row_index, work_order_id, article_code, package_type, specification, production_unit,
                    feeder_codes, maker_codes, input_quantity, final_quantity, planned_start, planned_end,
                    validation_status, validation_message
             FROM aps_plan_row WHERE batch_id = ?1 ORDER BY row_index",
        )?;
        let rows = stmt.query_map(params![batch_id], |row| {
            Ok(PlanRow {
                batch_id: row.get(0)?,
                row_index: row.get(1)?,
                work_order_id: row.get(2)?,
                article_code: row.get(3)?,
                package_type: row.get(4)?,
                specification: row.get(5)?,
                production_unit: row.get(6)?,
                feeder_codes: serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
                maker_codes: serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
                input_quantity: row.get(9)?,
                final_quantity: row.get(10)?,
                planned_start: str_to_dt(&row.get::<_, String>(11)?).unwrap_or_else(|_| Utc::now()),
                planned_end: str_to_dt(&row.get::<_, String>(12)?).unwrap_or_else(|_| Utc::now()),
                validation_status: validation_status_from_str(&row.get::<_, String>(13)?),
                validation_message: row.get(14)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
    }

    // -- orchestrator tasks --------------------------------------------------

    pub fn save_task(&self, task: &TaskRow) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO aps_task
                (task_id, batch_id, state, progress, current_stage, processed_records, total_records,
                 started_at, finished_at, options_json, error_message, result_summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                task.task_id,
                task.batch_id,
                task.state,
                task.progress,
                task.current_stage,
                task.processed_records,
                task.total_records,
                dt_to_str(task.started_at),
                task.finished_at.map(dt_to_str),
                task.options_json,
                task.error_message,
                task.result_summary_json,
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<TaskRow>> {
        self.conn
            .query_row(
                "SELECT task_id, batch_id, state, progress, current_stage, processed_records, total_records,
                        started_at, finished_at, options_json, error_message, result_summary_json
                 FROM aps_task WHERE task_id = ?1",
                params![task_id],
                |row| {
                    Ok(TaskRow {
                        task_id: row.get(0)?,
                        batch_id: row.get(1)?,
                        state: row.get(2)?,
                        progress: row.get(3)?,
                        current_stage: row.get(4)?,
                        processed_records: row.get(5)?,
                        total_records: row.get(6)?,
                        started_at: str_to_dt(&row.get::<_, String>(7)?).unwrap_or_else(|_| Utc::now()),
                        finished_at: row.get::<_, Option<String>>(8)?.and_then(|s| str_to_dt(&s).ok()),
                        options_json: row.get(9)?,
                        error_message: row.get(10)?,
                        result_summary_json: row.get(11)?,
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    // -- checkpoints --------------------------------------------------------

    /// Persists the draft set produced by `stage`, so a retried task can
    /// resume from the last successfully persisted stage instead of
    /// re-running the pipeline from the parser.
    pub fn save_checkpoint(&self, task_id: &str, stage: &str, drafts_json: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO aps_task_checkpoint (task_id, stage, drafts_json, saved_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, stage, drafts_json, dt_to_str(Utc::now())],
        )?;
        Ok(())
    }

    pub fn load_checkpoint(&self, task_id: &str, stage: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT drafts_json FROM aps_task_checkpoint WHERE task_id = ?1 AND stage = ?2",
                params![task_id, stage],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    /// Latest persisted stage name for `task_id`, if any — the resume point
    /// a retry starts from.
    pub fn latest_checkpoint_stage(&self, task_id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT stage FROM aps_task_checkpoint WHERE task_id = ?1 ORDER BY saved_at DESC LIMIT 1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    // -- work orders ----------------------------------------------------

    pub fn save_work_orders(&mut self, orders: &[WorkOrder]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for order in orders {
            match order {
                WorkOrder::MakerOrder {
                    id,
                    maker_code,
                    article_code,
                    input_quantity,
                    final_quantity,
                    planned_start,
                    planned_end,
                    sequence,
                    plan_date,
                    related_feeder_order,
                    is_backup,
                    backup_reason,
                    split_from,
                    split_index,
                    merged_from,
                } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO aps_work_order_maker
                            (id, maker_code, article_code, input_quantity, final_quantity, planned_start, planned_end,
                             sequence, plan_date, related_feeder_order, is_backup, backup_reason, split_from, split_index, merged_from)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                        params![
                            id,
                            maker_code,
                            article_code,
                            input_quantity,
                            final_quantity,
                            dt_to_str(*planned_start),
                            dt_to_str(*planned_end),
                            sequence,
                            plan_date.to_string(),
                            related_feeder_order,
                            *is_backup as i64,
                            backup_reason,
                            split_from,
                            split_index,
                            serde_json::to_string(merged_from)?,
                        ],
                    )?;
                }
                WorkOrder::FeederOrder { id, feeder_code, article_code, total_quantity, planned_start, planned_end, plan_date, related_maker_orders } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO aps_work_order_feeder
                            (id, feeder_code, article_code, total_quantity, planned_start, planned_end, plan_date, related_maker_orders)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            id,
                            feeder_code,
                            article_code,
                            total_quantity,
                            dt_to_str(*planned_start),
                            dt_to_str(*planned_end),
                            plan_date.to_string(),
                            serde_json::to_string(related_maker_orders)?,
                        ],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    // -- reference data ---------------------------------------------------

    pub fn load_reference_data(&self) -> Result<ReferenceData> {
        let mut machines_stmt = self.conn.prepare("SELECT code, kind, equipment_model, active FROM aps_machine")?;
        let machines = machines_stmt
            .query_map([], |row| {
                Ok(Machine {
                    code: row.get(0)?,
                    kind: machine_kind_from_str(&row.get::<_, String>(1)?),
                    equipment_model: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut relations_stmt = self
            .conn
            .prepare("SELECT feeder_code, maker_code, priority, valid_from, valid_to, changeover_override_minutes FROM aps_machine_relation")?;
        let relations = relations_stmt
            .query_map([], |row| {
                let valid_to: Option<String> = row.get(4)?;
                let changeover: Option<i64> = row.get(5)?;
                Ok(MachineRelation {
                    feeder_code: row.get(0)?,
                    maker_code: row.get(1)?,
                    priority: row.get(2)?,
                    valid_from: str_to_dt(&row.get::<_, String>(3)?).unwrap_or_else(|_| Utc::now()),
                    valid_to: valid_to.and_then(|s| str_to_dt(&s).ok()),
                    changeover_override: changeover.map(chrono::Duration::minutes),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut speed_stmt = self
            .conn
            .prepare("SELECT machine_code, article_code, rate_boxes_per_hour, efficiency, valid_from, valid_to FROM aps_machine_speed")?;
        let speed_rules = speed_stmt
            .query_map([], |row| {
                let valid_to: Option<String> = row.get(5)?;
                Ok(SpeedRule {
                    machine_code: row.get(0)?,
                    article_code: row.get(1)?,
                    rate_boxes_per_hour: row.get(2)?,
                    efficiency: row.get(3)?,
                    valid_from: str_to_dt(&row.get::<_, String>(4)?).unwrap_or_else(|_| Utc::now()),
                    valid_to: valid_to.and_then(|s| str_to_dt(&s).ok()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut shift_stmt = self
            .conn
            .prepare("SELECT shift_name, machine_code, start_time, end_time, overtime_allowed, max_overtime_minutes FROM aps_shift_config")?;
        let shifts = shift_stmt
            .query_map([], |row| {
                Ok(ShiftDef {
                    shift_name: row.get(0)?,
                    machine_code: row.get(1)?,
                    start_time: NaiveTime::parse_from_str(&row.get::<_, String>(2)?, "%H:%M:%S").unwrap_or_default(),
                    end_time: NaiveTime::parse_from_str(&row.get::<_, String>(3)?, "%H:%M:%S").unwrap_or_default(),
                    overtime_allowed: row.get::<_, i64>(4)? != 0,
                    max_overtime_minutes: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut maintenance_stmt = self.conn.prepare("SELECT machine_code, start, end, status FROM aps_maintenance_window")?;
        let maintenance_windows = maintenance_stmt
            .query_map([], |row| {
                Ok(MaintenanceWindow {
                    machine_code: row.get(0)?,
                    start: str_to_dt(&row.get::<_, String>(1)?).unwrap_or_else(|_| Utc::now()),
                    end: str_to_dt(&row.get::<_, String>(2)?).unwrap_or_else(|_| Utc::now()),
                    status: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ReferenceData { machines, relations, speed_rules, shifts, maintenance_windows })
    }

    pub fn save_maintenance_window(&self, window: &MaintenanceWindow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO aps_maintenance_window (machine_code, start, end, status) VALUES (?1, ?2, ?3, ?4)",
            params![window.machine_code, dt_to_str(window.start), dt_to_str(window.end), window.status],
        )?;
        Ok(())
    }

    pub fn save_machine(&self, machine: &Machine) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO aps_machine (code, kind, equipment_model, active) VALUES (?1, ?2, ?3, ?4)",
            params![machine.code, machine_kind_to_str(machine.kind), machine.equipment_model, machine.active as i64],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cadence;
    use chrono::TimeZone;

    fn sample_batch() -> ImportBatch {
        ImportBatch::new(Cadence::Decade, "plan.xlsx".into(), 1024, "abc123".into())
    }

    #[test]
    fn round_trips_an_import_batch() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch = sample_batch();
        store.save_import_batch(&batch).unwrap();
        let loaded = store.get_import_batch(&batch.id).unwrap().unwrap();
        assert_eq!(loaded.id, batch.id);
        assert_eq!(loaded.file_name, "plan.xlsx");
    }

    #[test]
    fn finds_batch_by_content_digest_for_duplicate_detection() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch = sample_batch();
        store.save_import_batch(&batch).unwrap();
        let found = store.find_batch_by_digest("abc123").unwrap();
        assert!(found.is_some());
        assert!(store.find_batch_by_digest("nope").unwrap().is_none());
    }

    #[test]
    fn round_trips_plan_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let row = PlanRow {
            batch_id: "b1".into(),
            row_index: 1,
            work_order_id: "W1".into(),
            article_code: "ART1".into(),
            package_type: "box".into(),
            specification: "84mm".into(),
            production_unit: "line1".into(),
            feeder_codes: vec!["F1".into()],
            maker_codes: vec!["M1".into()],
            input_quantity: 500,
            final_quantity: 500,
            planned_start: Utc.with_ymd_and_hms(2024, 11, 1, 8, 0, 0).unwrap(),
            planned_end: Utc.with_ymd_and_hms(2024, 11, 1, 16, 0, 0).unwrap(),
            validation_status: ValidationStatus::Valid,
            validation_message: None,
        };
        store.save_plan_rows(&[row]).unwrap();
        let loaded = store.load_plan_rows("b1").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].maker_codes, vec!["M1".to_string()]);
    }

    #[test]
    fn save_and_load_task_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = TaskRow {
            task_id: "t1".into(),
            batch_id: "b1".into(),
            state: "running".into(),
            progress: 42,
            current_stage: "split".into(),
            processed_records: 10,
            total_records: 100,
            started_at: Utc::now(),
            finished_at: None,
            options_json: "{}".into(),
            error_message: None,
            result_summary_json: None,
        };
        store.save_task(&task).unwrap();
        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded.progress, 42);
        assert_eq!(loaded.current_stage, "split");
    }

    #[test]
    fn checkpoint_round_trips_and_reports_latest_stage() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_checkpoint("t1", "merge", "[]").unwrap();
        store.save_checkpoint("t1", "split", "[1,2]").unwrap();
        assert_eq!(store.load_checkpoint("t1", "split").unwrap(), Some("[1,2]".to_string()));
        assert_eq!(store.latest_checkpoint_stage("t1").unwrap(), Some("split".to_string()));
    }
}
