//! SQLite persistence for every `aps_*` table named in the external
//! interfaces: import batches, parsed rows, orchestrator tasks, emitted work
//! orders, and the reference-data tables. One connection per [`SqliteStore`],
//! following the same single-connection-plus-WAL shape as the teacher's
//! `vector_store::sqlite` module.

pub mod sqlite;

pub use sqlite::{SqliteStore, TaskRow};
