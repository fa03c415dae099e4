use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Error;

// ── Schedules ────────────────────────────────────────────────────

/// Repeat cadence of a schedule rule. Closed set: anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepeatKind {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl RepeatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatKind::Once => "ONCE",
            RepeatKind::Daily => "DAILY",
            RepeatKind::Weekly => "WEEKLY",
            RepeatKind::Monthly => "MONTHLY",
        }
    }
}

impl FromStr for RepeatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONCE" => Ok(RepeatKind::Once),
            "DAILY" => Ok(RepeatKind::Daily),
            "WEEKLY" => Ok(RepeatKind::Weekly),
            "MONTHLY" => Ok(RepeatKind::Monthly),
            _ => Err(Error::invalid_rule(format!("unsupported cadence {s:?}"))),
        }
    }
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring (or one-off) slot. Both bounds carry the UTC offset captured
/// when the rule was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: Ulid,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub repeat: RepeatKind,
}

impl ScheduleRule {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// One concrete dated instance of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Ulid,
    pub rule_id: Ulid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Occurrence {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// A rule together with its materialized series, sorted by start.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub rule: ScheduleRule,
    pub occurrences: Vec<Occurrence>,
}

// ── Ranked collections ───────────────────────────────────────────

/// Each kind is an independent ranked collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RankedKind {
    Group,
    Location,
}

impl RankedKind {
    pub const ALL: [RankedKind; 2] = [RankedKind::Group, RankedKind::Location];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankedKind::Group => "group",
            RankedKind::Location => "location",
        }
    }
}

impl fmt::Display for RankedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: Ulid,
    pub kind: RankedKind,
    pub name: String,
    /// 1-based position. `0` only appears transiently inside a working set.
    pub rank: u32,
    pub visible: bool,
}

/// Payload for a new ranked item; rank and visibility are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRankedItem {
    pub name: String,
}

/// One step of a committed rank transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankOp {
    Created(RankedItem),
    Deleted(Ulid),
    Reranked { id: Ulid, rank: u32 },
    VisibilitySet { id: Ulid, visible: bool },
}

/// Committed state of one ranked kind.
#[derive(Debug, Clone)]
pub struct Collection {
    pub kind: RankedKind,
    /// Bumped on every commit; a working set taken at an older version cannot commit.
    pub version: u64,
    /// Sorted by rank.
    pub items: Vec<RankedItem>,
}

impl Collection {
    pub fn new(kind: RankedKind) -> Self {
        Self {
            kind,
            version: 0,
            items: Vec::new(),
        }
    }

    pub fn get(&self, id: &Ulid) -> Option<&RankedItem> {
        self.items.iter().find(|i| i.id == *id)
    }

    pub fn apply(&mut self, op: &RankOp) {
        apply_rank_op(&mut self.items, op);
    }

    /// Restore rank order after a batch of ops.
    pub fn sort(&mut self) {
        self.items.sort_by_key(|i| i.rank);
    }
}

/// Apply a single op to a list of items. Unknown ids are ignored.
pub fn apply_rank_op(items: &mut Vec<RankedItem>, op: &RankOp) {
    match op {
        RankOp::Created(item) => items.push(item.clone()),
        RankOp::Deleted(id) => items.retain(|i| i.id != *id),
        RankOp::Reranked { id, rank } => {
            if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
                item.rank = *rank;
            }
        }
        RankOp::VisibilitySet { id, visible } => {
            if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
                item.visible = *visible;
            }
        }
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// One event per committed unit of work. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ScheduleCreated {
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    },
    ScheduleReplaced {
        rule: ScheduleRule,
        occurrences: Vec<Occurrence>,
    },
    ScheduleDeleted {
        id: Ulid,
    },
    RanksCommitted {
        kind: RankedKind,
        ops: Vec<RankOp>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleCreated {
    pub rule_id: Ulid,
    pub occurrences: Vec<Occurrence>,
}
