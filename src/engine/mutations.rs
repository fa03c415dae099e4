use ulid::Ulid;

use crate::error::{Error, Result};
use crate::limits::*;
use crate::model::*;
use crate::observability::{RANKED_ITEMS, TX_CONFLICTS_TOTAL};
use crate::ranking::{self, RankedTx, WorkingSet};

use super::{apply_ranks, Engine};

impl Engine {
    /// Snapshot `kind` into a private working set.
    pub async fn begin_ranks(&self, kind: RankedKind) -> WorkingSet {
        let coll = self.collection(kind);
        let guard = coll.read().await;
        WorkingSet::new(kind, guard.version, guard.items.clone())
    }

    /// Publish a working set as one WAL record.
    ///
    /// Refused with `TransactionConflict` when the collection moved past the
    /// version the working set was taken at; nothing is written in that case.
    pub async fn commit_ranks(&self, tx: WorkingSet) -> Result<()> {
        if tx.is_empty() {
            return Ok(());
        }
        let kind = tx.kind();
        debug_assert!(
            ranking::is_dense(&tx.find_all()),
            "refusing to commit sparse ranks for {kind}"
        );

        let _gate = self.commit_gate.read().await;
        let coll = self.collection(kind);
        let mut guard = coll.write().await;
        if guard.version != tx.version() {
            metrics::counter!(TX_CONFLICTS_TOTAL, "kind" => kind.as_str()).increment(1);
            tracing::debug!(
                "{kind} commit refused: snapshot v{} but collection at v{}",
                tx.version(),
                guard.version
            );
            return Err(Error::TransactionConflict(kind));
        }

        let event = Event::RanksCommitted {
            kind,
            ops: tx.into_ops(),
        };
        self.wal_append(&event).await?;
        if let Event::RanksCommitted { ops, .. } = &event {
            apply_ranks(&mut guard, ops);
        }
        metrics::gauge!(RANKED_ITEMS, "kind" => kind.as_str()).set(guard.items.len() as f64);
        drop(guard);

        self.notify.send(&event);
        Ok(())
    }

    pub async fn create_rule(
        &self,
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    ) -> Result<Ulid> {
        if self.schedules.len() >= MAX_SCHEDULES {
            return Err(Error::LimitExceeded("too many schedules"));
        }
        let id = rule.id;
        let _gate = self.commit_gate.read().await;
        self.persist_schedule_event(None, Event::ScheduleCreated { rule, occurrences })
            .await?;
        Ok(id)
    }

    pub async fn replace_rule(
        &self,
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    ) -> Result<()> {
        let id = rule.id;
        let shared = self.schedule(&id).ok_or(Error::NotFound(id))?;
        let _gate = self.commit_gate.read().await;
        let mut guard = shared.write().await;
        // deleted while we waited for the lock
        if !self.schedules.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        let event = Event::ScheduleReplaced { rule, occurrences };
        self.persist_schedule_event(Some(&mut *guard), event).await
    }

    pub async fn remove_rule(&self, id: Ulid) -> Result<()> {
        let shared = self.schedule(&id).ok_or(Error::NotFound(id))?;
        let _gate = self.commit_gate.read().await;
        let _guard = shared.write().await;
        if !self.schedules.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        self.persist_schedule_event(None, Event::ScheduleDeleted { id })
            .await
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<()> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        let shared: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        for entry in shared {
            let state = entry.read().await;
            events.push(Event::ScheduleCreated {
                rule: state.rule.clone(),
                occurrences: state.occurrences.clone(),
            });
        }

        for kind in RankedKind::ALL {
            let coll = self.collection(kind);
            let guard = coll.read().await;
            if guard.items.is_empty() {
                continue;
            }
            events.push(Event::RanksCommitted {
                kind,
                ops: guard.items.iter().cloned().map(RankOp::Created).collect(),
            });
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(super::WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| Error::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| Error::Persistence("WAL writer dropped response".into()))??;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(super::WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
