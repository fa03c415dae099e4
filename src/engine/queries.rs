use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    /// Committed items of `kind`, ordered by rank.
    pub async fn list_ranked(&self, kind: RankedKind) -> Vec<RankedItem> {
        let coll = self.collection(kind);
        let guard = coll.read().await;
        guard.items.clone()
    }

    pub async fn get_ranked(&self, kind: RankedKind, id: &Ulid) -> Option<RankedItem> {
        let coll = self.collection(kind);
        let guard = coll.read().await;
        guard.get(id).cloned()
    }

    pub async fn get_rule(&self, id: &Ulid) -> Option<ScheduleRule> {
        let shared = self.schedule(id)?;
        let guard = shared.read().await;
        Some(guard.rule.clone())
    }

    pub async fn get_occurrences(&self, id: &Ulid) -> Option<Vec<Occurrence>> {
        let shared = self.schedule(id)?;
        let guard = shared.read().await;
        Some(guard.occurrences.clone())
    }

    /// All rules, ordered by start.
    pub async fn list_rules(&self) -> Vec<ScheduleRule> {
        let shared: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        let mut rules = Vec::with_capacity(shared.len());
        for entry in shared {
            rules.push(entry.read().await.rule.clone());
        }
        rules.sort_by_key(|r| r.start);
        rules
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }
}
