//! Dense-rank maintenance for ordered collections.
//!
//! Every operation here runs against a [`RankedTx`], an uncommitted working
//! view of one collection. Intermediate states (two items sharing a rank, the
//! `0` sentinel) only ever exist inside that view; the store commits the end
//! result as a single unit.

use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::{apply_rank_op, NewRankedItem, RankOp, RankedItem, RankedKind};

/// Rank given to an item being promoted, so the reindex sorts it first.
const PROMOTE_SENTINEL: u32 = 0;

/// Transactional read/write view over all items of one ranked kind.
pub trait RankedTx: Send {
    fn kind(&self) -> RankedKind;

    /// All items ordered by rank ascending. Ties keep their previous relative order.
    fn find_all(&self) -> Vec<RankedItem>;

    fn find_by_id(&self, id: Ulid) -> Option<RankedItem>;

    fn max_rank(&self) -> Option<u32>;

    fn update_ranks(&mut self, batch: &[(Ulid, u32)]) -> Result<()>;

    fn set_visibility(&mut self, id: Ulid, visible: bool) -> Result<()>;

    fn create(&mut self, item: RankedItem) -> Ulid;

    fn delete(&mut self, id: Ulid) -> Result<()>;
}

// ── Working set ──────────────────────────────────────────────────

/// Private staged copy of a collection plus the ops applied to it.
///
/// `version` is the collection version the copy was taken at; the store uses
/// it to refuse commits that raced with another writer.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    kind: RankedKind,
    version: u64,
    items: Vec<RankedItem>,
    ops: Vec<RankOp>,
}

impl WorkingSet {
    pub fn new(kind: RankedKind, version: u64, mut items: Vec<RankedItem>) -> Self {
        items.sort_by_key(|i| i.rank);
        Self {
            kind,
            version,
            items,
            ops: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn ops(&self) -> &[RankOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<RankOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn record(&mut self, op: RankOp) {
        apply_rank_op(&mut self.items, &op);
        self.ops.push(op);
    }

    fn require(&self, id: Ulid) -> Result<()> {
        if self.items.iter().any(|i| i.id == id) {
            Ok(())
        } else {
            Err(Error::NotFound(id))
        }
    }
}

impl RankedTx for WorkingSet {
    fn kind(&self) -> RankedKind {
        self.kind
    }

    fn find_all(&self) -> Vec<RankedItem> {
        let mut items = self.items.clone();
        items.sort_by_key(|i| i.rank);
        items
    }

    fn find_by_id(&self, id: Ulid) -> Option<RankedItem> {
        self.items.iter().find(|i| i.id == id).cloned()
    }

    fn max_rank(&self) -> Option<u32> {
        self.items.iter().map(|i| i.rank).max()
    }

    fn update_ranks(&mut self, batch: &[(Ulid, u32)]) -> Result<()> {
        for (id, _) in batch {
            self.require(*id)?;
        }
        for &(id, rank) in batch {
            self.record(RankOp::Reranked { id, rank });
        }
        Ok(())
    }

    fn set_visibility(&mut self, id: Ulid, visible: bool) -> Result<()> {
        self.require(id)?;
        self.record(RankOp::VisibilitySet { id, visible });
        Ok(())
    }

    fn create(&mut self, item: RankedItem) -> Ulid {
        let id = item.id;
        self.record(RankOp::Created(item));
        id
    }

    fn delete(&mut self, id: Ulid) -> Result<()> {
        self.require(id)?;
        self.record(RankOp::Deleted(id));
        // keep items in rank order for the following reads
        self.items.sort_by_key(|i| i.rank);
        Ok(())
    }
}

// ── Rank mutations ───────────────────────────────────────────────

/// Insert a new visible item at rank 1, shifting every existing item down by one.
pub fn insert_at_head(tx: &mut impl RankedTx, new: NewRankedItem) -> Result<RankedItem> {
    let shifted: Vec<(Ulid, u32)> = tx
        .find_all()
        .into_iter()
        .map(|i| (i.id, i.rank + 1))
        .collect();
    tx.update_ranks(&shifted)?;

    let item = RankedItem {
        id: Ulid::new(),
        kind: tx.kind(),
        name: new.name,
        rank: 1,
        visible: true,
    };
    tx.create(item.clone());
    Ok(item)
}

/// Flip visibility. Hiding sends the item to the tail; showing promotes it to rank 1.
pub fn toggle_visibility(tx: &mut impl RankedTx, id: Ulid) -> Result<RankedItem> {
    let item = tx.find_by_id(id).ok_or(Error::NotFound(id))?;

    if item.visible {
        let tail = tx.max_rank().unwrap_or(0) + 1;
        tx.update_ranks(&[(id, tail)])?;
        tx.set_visibility(id, false)?;
    } else {
        tx.update_ranks(&[(id, PROMOTE_SENTINEL)])?;
        tx.set_visibility(id, true)?;
    }
    reindex_dense(tx)?;

    tx.find_by_id(id).ok_or(Error::NotFound(id))
}

/// Move `id` to the rank currently held by `target_id`, shifting the items in between.
pub fn move_to_position(tx: &mut impl RankedTx, id: Ulid, target_id: Ulid) -> Result<RankedItem> {
    let item = tx.find_by_id(id).ok_or(Error::NotFound(id))?;
    let target = tx.find_by_id(target_id).ok_or(Error::NotFound(target_id))?;
    let (current, wanted) = (item.rank, target.rank);

    if current == wanted {
        return Ok(item);
    }

    let mut batch: Vec<(Ulid, u32)> = if current > wanted {
        // toward the front: [wanted, current) moves back by one
        tx.find_all()
            .into_iter()
            .filter(|i| i.id != id && i.rank >= wanted && i.rank < current)
            .map(|i| (i.id, i.rank + 1))
            .collect()
    } else {
        // toward the back: (current, wanted] moves forward by one
        tx.find_all()
            .into_iter()
            .filter(|i| i.id != id && i.rank > current && i.rank <= wanted)
            .map(|i| (i.id, i.rank - 1))
            .collect()
    };
    batch.push((id, wanted));
    tx.update_ranks(&batch)?;

    tx.find_by_id(id).ok_or(Error::NotFound(id))
}

/// Delete `id` and close the gap it leaves.
pub fn remove(tx: &mut impl RankedTx, id: Ulid) -> Result<RankedItem> {
    let item = tx.find_by_id(id).ok_or(Error::NotFound(id))?;
    tx.delete(id)?;
    reindex_dense(tx)?;
    Ok(item)
}

/// Reassign `rank = position + 1` following the current rank order.
/// Only items whose rank actually changes are written.
pub fn reindex_dense(tx: &mut impl RankedTx) -> Result<()> {
    let batch: Vec<(Ulid, u32)> = tx
        .find_all()
        .into_iter()
        .enumerate()
        .filter_map(|(pos, i)| {
            let rank = pos as u32 + 1;
            (i.rank != rank).then_some((i.id, rank))
        })
        .collect();
    if batch.is_empty() {
        return Ok(());
    }
    tx.update_ranks(&batch)
}

/// True when the ranks of `items` are exactly `{1..N}`.
pub fn is_dense(items: &[RankedItem]) -> bool {
    let mut ranks: Vec<u32> = items.iter().map(|i| i.rank).collect();
    ranks.sort_unstable();
    ranks.iter().enumerate().all(|(pos, &r)| r == pos as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn empty() -> WorkingSet {
        WorkingSet::new(RankedKind::Group, 0, Vec::new())
    }

    fn named(name: &str) -> NewRankedItem {
        NewRankedItem { name: name.into() }
    }

    fn ranks(tx: &WorkingSet) -> Vec<(String, u32, bool)> {
        tx.find_all()
            .into_iter()
            .map(|i| (i.name, i.rank, i.visible))
            .collect()
    }

    fn row(name: &str, rank: u32, visible: bool) -> (String, u32, bool) {
        (name.to_string(), rank, visible)
    }

    fn order(tx: &WorkingSet) -> Vec<String> {
        tx.find_all().into_iter().map(|i| i.name).collect()
    }

    #[test]
    fn insert_at_head_shifts_existing() {
        let mut tx = empty();
        let a = insert_at_head(&mut tx, named("A")).unwrap();
        assert_eq!(a.rank, 1);
        assert!(a.visible);
        let b = insert_at_head(&mut tx, named("B")).unwrap();
        assert_eq!(b.rank, 1);
        assert_eq!(order(&tx), vec!["B", "A"]);
        assert_eq!(tx.find_by_id(a.id).unwrap().rank, 2);
        assert!(is_dense(&tx.find_all()));
    }

    #[test]
    fn hide_then_show_round_trip() {
        let mut tx = empty();
        insert_at_head(&mut tx, named("A")).unwrap();
        let b = insert_at_head(&mut tx, named("B")).unwrap();

        let hidden = toggle_visibility(&mut tx, b.id).unwrap();
        assert!(!hidden.visible);
        assert_eq!(ranks(&tx), vec![row("A", 1, true), row("B", 2, false)]);

        let shown = toggle_visibility(&mut tx, b.id).unwrap();
        assert!(shown.visible);
        assert_eq!(shown.rank, 1);
        assert_eq!(ranks(&tx), vec![row("B", 1, true), row("A", 2, true)]);
    }

    #[test]
    fn hide_last_item_keeps_it_last() {
        let mut tx = empty();
        let c = insert_at_head(&mut tx, named("C")).unwrap();
        insert_at_head(&mut tx, named("B")).unwrap();
        insert_at_head(&mut tx, named("A")).unwrap();
        toggle_visibility(&mut tx, c.id).unwrap();
        assert_eq!(order(&tx), vec!["A", "B", "C"]);
        assert!(is_dense(&tx.find_all()));
    }

    #[test]
    fn hidden_items_stay_contiguous_relative_to_each_other() {
        let mut tx = empty();
        let d = insert_at_head(&mut tx, named("D")).unwrap();
        let c = insert_at_head(&mut tx, named("C")).unwrap();
        insert_at_head(&mut tx, named("B")).unwrap();
        insert_at_head(&mut tx, named("A")).unwrap();
        toggle_visibility(&mut tx, c.id).unwrap();
        toggle_visibility(&mut tx, d.id).unwrap();
        assert_eq!(order(&tx), vec!["A", "B", "C", "D"]);
        // a newly inserted item goes before the hidden tail
        insert_at_head(&mut tx, named("E")).unwrap();
        assert_eq!(order(&tx), vec!["E", "A", "B", "C", "D"]);
    }

    #[test]
    fn move_toward_back() {
        let mut tx = empty();
        let z = insert_at_head(&mut tx, named("Z")).unwrap();
        insert_at_head(&mut tx, named("Y")).unwrap();
        let x = insert_at_head(&mut tx, named("X")).unwrap();
        assert_eq!(order(&tx), vec!["X", "Y", "Z"]);

        let moved = move_to_position(&mut tx, x.id, z.id).unwrap();
        assert_eq!(moved.rank, 3);
        assert_eq!(ranks(&tx), vec![row("Y", 1, true), row("Z", 2, true), row("X", 3, true)]);
    }

    #[test]
    fn move_toward_front() {
        let mut tx = empty();
        let d = insert_at_head(&mut tx, named("D")).unwrap();
        insert_at_head(&mut tx, named("C")).unwrap();
        let b = insert_at_head(&mut tx, named("B")).unwrap();
        insert_at_head(&mut tx, named("A")).unwrap();

        let moved = move_to_position(&mut tx, d.id, b.id).unwrap();
        assert_eq!(moved.rank, 2);
        assert_eq!(order(&tx), vec!["A", "D", "B", "C"]);
        assert!(is_dense(&tx.find_all()));
    }

    #[test]
    fn move_onto_self_is_noop() {
        let mut tx = empty();
        let a = insert_at_head(&mut tx, named("A")).unwrap();
        let ops_before = tx.ops().len();
        let moved = move_to_position(&mut tx, a.id, a.id).unwrap();
        assert_eq!(moved, a);
        assert_eq!(tx.ops().len(), ops_before);
    }

    #[test]
    fn move_unknown_ids_not_found() {
        let mut tx = empty();
        let a = insert_at_head(&mut tx, named("A")).unwrap();
        let ghost = Ulid::new();
        assert!(matches!(
            move_to_position(&mut tx, ghost, a.id),
            Err(Error::NotFound(id)) if id == ghost
        ));
        assert!(matches!(
            move_to_position(&mut tx, a.id, ghost),
            Err(Error::NotFound(id)) if id == ghost
        ));
    }

    #[test]
    fn toggle_and_remove_unknown_not_found() {
        let mut tx = empty();
        assert!(matches!(toggle_visibility(&mut tx, Ulid::new()), Err(Error::NotFound(_))));
        assert!(matches!(remove(&mut tx, Ulid::new()), Err(Error::NotFound(_))));
        assert!(tx.is_empty());
    }

    #[test]
    fn remove_closes_gap() {
        let mut tx = empty();
        insert_at_head(&mut tx, named("C")).unwrap();
        let b = insert_at_head(&mut tx, named("B")).unwrap();
        insert_at_head(&mut tx, named("A")).unwrap();

        let removed = remove(&mut tx, b.id).unwrap();
        assert_eq!(removed.name, "B");
        assert_eq!(ranks(&tx), vec![row("A", 1, true), row("C", 2, true)]);
    }

    #[test]
    fn reindex_repairs_gaps_in_order() {
        let items = [5, 2, 9]
            .into_iter()
            .map(|rank| RankedItem {
                id: Ulid::new(),
                kind: RankedKind::Location,
                name: format!("r{rank}"),
                rank,
                visible: true,
            })
            .collect();
        let mut tx = WorkingSet::new(RankedKind::Location, 3, items);
        reindex_dense(&mut tx).unwrap();
        assert_eq!(order(&tx), vec!["r2", "r5", "r9"]);
        assert!(is_dense(&tx.find_all()));
    }

    #[test]
    fn reindex_on_dense_set_writes_nothing() {
        let mut tx = empty();
        insert_at_head(&mut tx, named("A")).unwrap();
        insert_at_head(&mut tx, named("B")).unwrap();
        let before = tx.ops().len();
        reindex_dense(&mut tx).unwrap();
        assert_eq!(tx.ops().len(), before);
    }

    #[test]
    fn update_ranks_unknown_id_leaves_set_untouched() {
        let mut tx = empty();
        let a = insert_at_head(&mut tx, named("A")).unwrap();
        let before = tx.ops().len();
        let res = tx.update_ranks(&[(a.id, 5), (Ulid::new(), 1)]);
        assert!(matches!(res, Err(Error::NotFound(_))));
        assert_eq!(tx.ops().len(), before);
        assert_eq!(tx.find_by_id(a.id).unwrap().rank, 1);
    }

    #[test]
    fn is_dense_detects_gaps_and_duplicates() {
        let mk = |ranks: &[u32]| -> Vec<RankedItem> {
            ranks
                .iter()
                .map(|&rank| RankedItem {
                    id: Ulid::new(),
                    kind: RankedKind::Group,
                    name: String::new(),
                    rank,
                    visible: true,
                })
                .collect()
        };
        assert!(is_dense(&mk(&[])));
        assert!(is_dense(&mk(&[2, 1, 3])));
        assert!(!is_dense(&mk(&[1, 3])));
        assert!(!is_dense(&mk(&[1, 1, 2])));
        assert!(!is_dense(&mk(&[0, 1])));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Insert,
        Toggle(usize),
        Move(usize, usize),
        Remove(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => Just(Step::Insert),
            2 => any::<usize>().prop_map(Step::Toggle),
            2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Move(a, b)),
            1 => any::<usize>().prop_map(Step::Remove),
        ]
    }

    proptest! {
        #[test]
        fn ranks_stay_dense(steps in proptest::collection::vec(step(), 1..60)) {
            let mut tx = empty();
            for (n, s) in steps.into_iter().enumerate() {
                let all = tx.find_all();
                let pick = |i: usize| all[i % all.len()].id;
                match s {
                    Step::Insert => {
                        insert_at_head(&mut tx, named(&format!("i{n}"))).unwrap();
                    }
                    Step::Toggle(i) if !all.is_empty() => {
                        toggle_visibility(&mut tx, pick(i)).unwrap();
                    }
                    Step::Move(a, b) if !all.is_empty() => {
                        move_to_position(&mut tx, pick(a), pick(b)).unwrap();
                    }
                    Step::Remove(i) if !all.is_empty() => {
                        remove(&mut tx, pick(i)).unwrap();
                    }
                    _ => {}
                }
                prop_assert!(is_dense(&tx.find_all()));
            }
        }
    }
}
