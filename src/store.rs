//! Persistence seams. Services depend on these traits, never on a concrete store.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::model::{Occurrence, RankedItem, RankedKind, ScheduleRule};
use crate::ranking::RankedTx;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Persist a rule and its whole series as one unit. Returns the rule id.
    async fn create_rule_and_occurrences(
        &self,
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    ) -> Result<Ulid>;

    /// Swap an existing rule and its series for new ones as one unit.
    async fn replace_rule_and_occurrences(
        &self,
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    ) -> Result<()>;

    /// Delete a rule together with all of its occurrences.
    async fn delete_rule(&self, id: Ulid) -> Result<()>;

    async fn find_rule(&self, id: Ulid) -> Result<Option<ScheduleRule>>;

    async fn find_occurrences_by_rule_id(&self, id: Ulid) -> Result<Vec<Occurrence>>;
}

#[async_trait]
pub trait RankedStore: Send + Sync {
    type Tx: RankedTx + 'static;

    /// Open a working view of `kind`. Dropping it without `commit` discards it.
    async fn begin(&self, kind: RankedKind) -> Result<Self::Tx>;

    /// Publish every change made through `tx`, or none of them.
    ///
    /// Fails with `TransactionConflict` if the collection changed since `begin`.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Committed items of `kind`, ordered by rank.
    async fn find_all(&self, kind: RankedKind) -> Result<Vec<RankedItem>>;

    async fn find_by_id(&self, kind: RankedKind, id: Ulid) -> Result<Option<RankedItem>>;
}
