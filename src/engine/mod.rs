mod mutations;
mod queries;
mod store;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCollection = Arc<RwLock<Collection>>;
pub type SharedSchedule = Arc<RwLock<ScheduleState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single commit (one write, one fsync) for the whole batch.
/// 5. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = pending {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer for {} stopped", wal.path().display());
}

/// Stage the whole batch and commit it with one fsync. A failed batch leaves
/// nothing behind in the log.
fn flush_batch(
    wal: &mut Wal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.stage(event) {
            wal.discard_staged();
            return Err(e);
        }
    }
    wal.commit_staged()
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.rewrite(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// WAL-backed store for schedule rules and ranked collections.
///
/// Each ranked kind is one `RwLock`ed collection with a version counter;
/// rank changes are staged in a [`WorkingSet`](crate::ranking::WorkingSet)
/// and published by `commit` only if nobody else committed in between.
pub struct Engine {
    pub(super) collections: DashMap<RankedKind, SharedCollection>,
    pub(super) schedules: DashMap<Ulid, SharedSchedule>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared while appending and applying; compaction
    /// holds it exclusively so its snapshot cannot miss a concurrent commit.
    pub(super) commit_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a committed rank transaction to its collection (caller holds the lock).
fn apply_ranks(coll: &mut Collection, ops: &[RankOp]) {
    for op in ops {
        coll.apply(op);
    }
    coll.sort();
    coll.version += 1;
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            collections: RankedKind::ALL
                .into_iter()
                .map(|kind| (kind, Arc::new(RwLock::new(Collection::new(kind)))))
                .collect(),
            schedules: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notify,
        };

        // We're the sole owner of every lock during replay, so try_write always
        // succeeds. Never block here: this may run inside an async context.
        for event in &events {
            match event {
                Event::RanksCommitted { kind, ops } => {
                    let coll = engine.collection(*kind);
                    let mut guard = coll.try_write().map_err(io::Error::other)?;
                    apply_ranks(&mut guard, ops);
                }
                Event::ScheduleCreated { rule, occurrences } => {
                    engine.insert_schedule(rule.clone(), occurrences.clone());
                }
                Event::ScheduleReplaced { rule, occurrences } => {
                    if let Some(entry) = engine.schedules.get(&rule.id) {
                        let mut guard = entry.try_write().map_err(io::Error::other)?;
                        guard.rule = rule.clone();
                        guard.occurrences = occurrences.clone();
                    }
                }
                Event::ScheduleDeleted { id } => {
                    engine.schedules.remove(id);
                }
            }
        }

        tracing::info!(
            "replayed {} WAL events from {}: {} schedules",
            events.len(),
            wal_path.display(),
            engine.schedules.len()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| Error::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| Error::Persistence("WAL writer dropped response".into()))??;
        Ok(())
    }

    /// Every kind is created up front, so lookups cannot miss.
    pub(super) fn collection(&self, kind: RankedKind) -> SharedCollection {
        self.collections
            .entry(kind)
            .or_insert_with(|| Arc::new(RwLock::new(Collection::new(kind))))
            .value()
            .clone()
    }

    pub(super) fn schedule(&self, id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(id).map(|e| e.value().clone())
    }

    fn insert_schedule(&self, rule: ScheduleRule, occurrences: Vec<Occurrence>) {
        self.schedules.insert(
            rule.id,
            Arc::new(RwLock::new(ScheduleState { rule, occurrences })),
        );
    }

    /// WAL-append + apply + notify for schedule events. The caller holds the
    /// rule's write lock (if any) and the commit gate.
    pub(super) async fn persist_schedule_event(
        &self,
        guard: Option<&mut ScheduleState>,
        event: Event,
    ) -> Result<()> {
        self.wal_append(&event).await?;
        match (&event, guard) {
            (Event::ScheduleCreated { rule, occurrences }, _) => {
                self.insert_schedule(rule.clone(), occurrences.clone());
            }
            (Event::ScheduleReplaced { rule, occurrences }, Some(state)) => {
                state.rule = rule.clone();
                state.occurrences = occurrences.clone();
            }
            (Event::ScheduleDeleted { id }, _) => {
                self.schedules.remove(id);
            }
            _ => {}
        }
        metrics::gauge!(crate::observability::SCHEDULES_ACTIVE).set(self.schedules.len() as f64);
        self.notify.send(&event);
        Ok(())
    }
}
