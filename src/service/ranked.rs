use std::sync::Arc;
use std::time::Instant;

use ulid::Ulid;

use crate::error::{Error, Result};
use crate::limits::{MAX_ITEMS_PER_KIND, MAX_NAME_LEN};
use crate::model::{NewRankedItem, RankedItem, RankedKind};
use crate::observability::{status_label, MUTATIONS_TOTAL, MUTATION_DURATION_SECONDS};
use crate::ranking::{self, RankedTx};
use crate::store::RankedStore;

use super::{with_transaction, RetryPolicy};

/// Rank-keeping operations for one kind of entity (groups, locations).
pub struct RankedEntityService<S: RankedStore> {
    store: Arc<S>,
    kind: RankedKind,
    retry: RetryPolicy,
}

impl<S: RankedStore> Clone for RankedEntityService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind,
            retry: self.retry,
        }
    }
}

fn record<T>(op: &'static str, started: Instant, result: &Result<T>) {
    metrics::counter!(MUTATIONS_TOTAL, "op" => op, "status" => status_label(result)).increment(1);
    metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

impl<S: RankedStore> RankedEntityService<S> {
    pub fn new(store: Arc<S>, kind: RankedKind, retry: RetryPolicy) -> Self {
        Self { store, kind, retry }
    }

    pub fn kind(&self) -> RankedKind {
        self.kind
    }

    /// Create an item. New items always land at rank 1.
    pub async fn create(&self, payload: NewRankedItem) -> Result<RankedItem> {
        let name = payload.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidName("must not be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::LimitExceeded("name too long"));
        }

        let started = Instant::now();
        let result = with_transaction(&*self.store, self.kind, self.retry, |tx| {
            if tx.find_all().len() >= MAX_ITEMS_PER_KIND {
                return Err(Error::LimitExceeded("too many items"));
            }
            ranking::insert_at_head(tx, NewRankedItem { name: name.clone() })
        })
        .await;
        record("create", started, &result);
        if let Ok(item) = &result {
            tracing::info!("{} {} created: {:?}", self.kind, item.id, item.name);
        }
        result
    }

    /// Hide a visible item (sent to the tail) or show a hidden one (promoted to rank 1).
    pub async fn toggle_visible(&self, id: Ulid) -> Result<RankedItem> {
        let started = Instant::now();
        let result = with_transaction(&*self.store, self.kind, self.retry, |tx| {
            ranking::toggle_visibility(tx, id)
        })
        .await;
        record("toggle_visible", started, &result);
        if let Ok(item) = &result {
            tracing::info!("{} {id} visible={} rank={}", self.kind, item.visible, item.rank);
        }
        result
    }

    /// Move `id` into the position currently held by `target_id`.
    pub async fn move_item(&self, id: Ulid, target_id: Ulid) -> Result<RankedItem> {
        let started = Instant::now();
        let result = with_transaction(&*self.store, self.kind, self.retry, |tx| {
            ranking::move_to_position(tx, id, target_id)
        })
        .await;
        record("move", started, &result);
        if let Ok(item) = &result {
            tracing::info!("{} {id} moved to rank {}", self.kind, item.rank);
        }
        result
    }

    pub async fn delete(&self, id: Ulid) -> Result<()> {
        let started = Instant::now();
        let result = with_transaction(&*self.store, self.kind, self.retry, |tx| {
            ranking::remove(tx, id)
        })
        .await;
        record("delete", started, &result);
        let removed = result?;
        tracing::info!("{} {id} deleted: {:?}", self.kind, removed.name);
        Ok(())
    }

    /// Committed items, ordered by rank.
    pub async fn list(&self) -> Result<Vec<RankedItem>> {
        self.store.find_all(self.kind).await
    }

    /// Only the visible items, ordered by rank.
    pub async fn list_visible(&self) -> Result<Vec<RankedItem>> {
        let mut items = self.list().await?;
        items.retain(|i| i.visible);
        Ok(items)
    }

    pub async fn get(&self, id: Ulid) -> Result<RankedItem> {
        self.store
            .find_by_id(self.kind, id)
            .await?
            .ok_or(Error::NotFound(id))
    }
}
