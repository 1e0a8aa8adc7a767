//! Read-mostly reference data consulted by the pipeline stages: calendars,
//! maintenance windows, production speeds, and feeder/maker relations.
//!
//! Exposed to stages as an immutable [`snapshot::ReferenceSnapshot`] rather
//! than shared mutable state, per the design-notes REDESIGN FLAG on
//! module-level caches: readers get a consistent point-in-time view and a
//! refresh swaps in a new snapshot atomically.

pub mod calendar;
pub mod machine_relation;
pub mod maintenance;
pub mod snapshot;
pub mod speed;

pub use calendar::CalendarService;
pub use machine_relation::MachineRelationService;
pub use maintenance::MaintenanceService;
pub use snapshot::{ReferenceData, ReferenceSnapshot};
pub use speed::SpeedService;
