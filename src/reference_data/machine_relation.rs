use chrono::Duration;

use crate::domain::MachineRelation;

const GLOBAL_DEFAULT_CHANGEOVER: i64 = 15;

/// Resolves feeder→maker relations, including the per-feeder changeover
/// override decided in the design notes (Open Question (a)): a feeder's own
/// override wins; otherwise the global default applies.
pub struct MachineRelationService<'a> {
    relations: &'a [MachineRelation],
    global_default_changeover_minutes: i64,
}

impl<'a> MachineRelationService<'a> {
    pub fn new(relations: &'a [MachineRelation]) -> Self {
        MachineRelationService {
            relations,
            global_default_changeover_minutes: GLOBAL_DEFAULT_CHANGEOVER,
        }
    }

    pub fn with_global_default(relations: &'a [MachineRelation], default_minutes: i64) -> Self {
        MachineRelationService {
            relations,
            global_default_changeover_minutes: default_minutes,
        }
    }

    pub fn makers_for_feeder(&self, feeder_code: &str) -> Vec<&'a MachineRelation> {
        let mut rels: Vec<&MachineRelation> = self.relations.iter().filter(|r| r.feeder_code == feeder_code).collect();
        rels.sort_by_key(|r| r.priority);
        rels
    }

    pub fn feeders_for_maker(&self, maker_code: &str) -> Vec<&'a MachineRelation> {
        self.relations.iter().filter(|r| r.maker_code == maker_code).collect()
    }

    pub fn changeover_interval(&self, feeder_code: &str) -> Duration {
        self.relations
            .iter()
            .find(|r| r.feeder_code == feeder_code)
            .and_then(|r| r.changeover_override)
            .unwrap_or_else(|| Duration::minutes(self.global_default_changeover_minutes))
    }
}
