use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::domain::{Machine, MachineRelation, MaintenanceWindow, ShiftDef, SpeedRule};

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A consistent, immutable view of all reference tables, shared via `Arc` so
/// a stage that fans out across a worker pool hands every worker the same
/// snapshot rather than touching a shared mutable cache.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub machines: Vec<Machine>,
    pub relations: Vec<MachineRelation>,
    pub speed_rules: Vec<SpeedRule>,
    pub shifts: Vec<ShiftDef>,
    pub maintenance_windows: Vec<MaintenanceWindow>,
}

/// Holds the current [`ReferenceData`] snapshot behind a lock and refreshes
/// it on a TTL or on explicit invalidation. Readers call [`current`] and get
/// back an `Arc` clone that stays valid even if a refresh happens
/// concurrently (copy-on-write).
pub struct ReferenceSnapshot {
    inner: RwLock<(Arc<ReferenceData>, Instant)>,
    ttl: Duration,
}

impl ReferenceSnapshot {
    pub fn new(initial: ReferenceData) -> Self {
        ReferenceSnapshot {
            inner: RwLock::new((Arc::new(initial), Instant::now())),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(initial: ReferenceData, ttl: Duration) -> Self {
        ReferenceSnapshot {
            inner: RwLock::new((Arc::new(initial), Instant::now())),
            ttl,
        }
    }

    /// Returns the current snapshot, regardless of staleness; callers that
    /// need freshness call [`is_stale`] and [`replace`] explicitly.
    pub fn current(&self) -> Arc<ReferenceData> {
        self.inner.read().expect("reference snapshot lock poisoned").0.clone()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.read().expect("reference snapshot lock poisoned").1.elapsed() >= self.ttl
    }

    /// Atomically swaps in a freshly loaded snapshot.
    pub fn replace(&self, data: ReferenceData) {
        let mut guard = self.inner.write().expect("reference snapshot lock poisoned");
        *guard = (Arc::new(data), Instant::now());
    }
}
