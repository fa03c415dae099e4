use async_trait::async_trait;
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::*;
use crate::ranking::WorkingSet;
use crate::store::{RankedStore, RuleStore};

use super::Engine;

#[async_trait]
impl RuleStore for Engine {
    async fn create_rule_and_occurrences(
        &self,
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    ) -> Result<Ulid> {
        self.create_rule(rule, occurrences).await
    }

    async fn replace_rule_and_occurrences(
        &self,
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    ) -> Result<()> {
        self.replace_rule(rule, occurrences).await
    }

    async fn delete_rule(&self, id: Ulid) -> Result<()> {
        self.remove_rule(id).await
    }

    async fn find_rule(&self, id: Ulid) -> Result<Option<ScheduleRule>> {
        Ok(self.get_rule(&id).await)
    }

    async fn find_occurrences_by_rule_id(&self, id: Ulid) -> Result<Vec<Occurrence>> {
        self.get_occurrences(&id).await.ok_or(Error::NotFound(id))
    }
}

#[async_trait]
impl RankedStore for Engine {
    type Tx = WorkingSet;

    async fn begin(&self, kind: RankedKind) -> Result<WorkingSet> {
        Ok(self.begin_ranks(kind).await)
    }

    async fn commit(&self, tx: WorkingSet) -> Result<()> {
        self.commit_ranks(tx).await
    }

    async fn find_all(&self, kind: RankedKind) -> Result<Vec<RankedItem>> {
        Ok(self.list_ranked(kind).await)
    }

    async fn find_by_id(&self, kind: RankedKind, id: Ulid) -> Result<Option<RankedItem>> {
        Ok(self.get_ranked(kind, &id).await)
    }
}
