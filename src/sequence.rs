//! Work order id allocation.
//!
//! Ids are `H{type:2}{yyyymmdd}{seq:04d}`, `type` one of `JB` (maker order)
//! or `WS` (feeder order). The sequence counter lives in SQLite
//! (`aps_work_order_sequence`), one row per `(type, date)`; allocation
//! reserves a block of [`BLOCK_SIZE`] numbers per round trip instead of one
//! row-locked increment per id, the same batching trade the teacher's
//! `vector_store::sqlite` module makes between per-call durability and
//! per-call latency.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};

use crate::domain::OrderKind;
use crate::error::Result;

/// Numbers reserved from the database per cache refill.
const BLOCK_SIZE: i64 = 100;

fn type_code(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Maker => "JB",
        OrderKind::Feeder => "WS",
    }
}

struct Block {
    next: i64,
    remaining: i64,
}

/// Allocates unique, deterministic work order ids backed by a SQLite
/// counter table. Safe to share across threads: the in-process cache is
/// mutex-guarded and the database reservation itself runs in an immediate
/// transaction, so concurrent processes sharing the same database file
/// never hand out the same number.
pub struct IdAllocator {
    conn: Mutex<Connection>,
    cache: Mutex<HashMap<(&'static str, NaiveDate), Block>>,
}

impl IdAllocator {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS aps_work_order_sequence (
                order_type TEXT NOT NULL,
                plan_date TEXT NOT NULL,
                counter INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (order_type, plan_date)
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn), cache: Mutex::new(HashMap::new()) })
    }

    /// Allocates the next id for `kind` on `date`.
    pub fn next_id(&self, kind: OrderKind, date: NaiveDate) -> Result<String> {
        let code = type_code(kind);
        let seq = self.next_sequence(code, date)?;
        Ok(format!("H{code}{}{:04}", date.format("%Y%m%d"), seq))
    }

    fn next_sequence(&self, code: &'static str, date: NaiveDate) -> Result<i64> {
        let mut cache = self.cache.lock().unwrap();
        let key = (code, date);
        let needs_refill = cache.get(&key).map(|b| b.remaining == 0).unwrap_or(true);
        if needs_refill {
            let start = self.reserve_block(code, date)?;
            cache.insert(key, Block { next: start, remaining: BLOCK_SIZE });
        }
        let block = cache.get_mut(&key).expect("block just inserted or already present");
        let seq = block.next;
        block.next += 1;
        block.remaining -= 1;
        Ok(seq)
    }

    /// Reserves [`BLOCK_SIZE`] sequence numbers for `(code, date)` and
    /// returns the first (1-based) number in the reserved range.
    fn reserve_block(&self, code: &str, date: NaiveDate) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO aps_work_order_sequence (order_type, plan_date, counter) VALUES (?1, ?2, 0)",
            params![code, date.to_string()],
        )?;
        let current: i64 = tx.query_row(
            "SELECT counter FROM aps_work_order_sequence WHERE order_type = ?1 AND plan_date = ?2",
            params![code, date.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE aps_work_order_sequence SET counter = counter + ?1 WHERE order_type = ?2 AND plan_date = ?3",
            params![BLOCK_SIZE, code, date.to_string()],
        )?;
        tx.commit()?;
        Ok(current + 1)
    }
}
