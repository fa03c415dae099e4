//! Expansion of a schedule rule into its concrete occurrences.
//!
//! Expansion is pure and eager: the whole bounded series is returned at once
//! so it can be persisted as a single batch.

use chrono::{DateTime, FixedOffset, Months, TimeDelta, Utc};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::limits::HORIZON_MONTHS;
use crate::model::{Occurrence, RepeatKind, ScheduleRule};

/// Last instant at which an occurrence of `rule` may start.
pub fn horizon_limit(rule: &ScheduleRule) -> Result<DateTime<FixedOffset>> {
    rule.start
        .checked_add_months(Months::new(HORIZON_MONTHS))
        .ok_or_else(|| Error::invalid_rule("start time out of range"))
}

/// Reject rules that cannot produce a well-formed series.
pub fn validate(rule: &ScheduleRule) -> Result<()> {
    if rule.end <= rule.start {
        return Err(Error::invalid_rule(format!(
            "end {} is not after start {}",
            rule.end, rule.start
        )));
    }
    Ok(())
}

/// One cadence step forward from `from`. `None` for one-off rules.
///
/// Monthly steps clamp to the last day of a short month and carry on from
/// there, so a series started on the 31st settles on the 29th after February.
fn next_start(repeat: RepeatKind, from: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    match repeat {
        RepeatKind::Once => None,
        RepeatKind::Daily => from.checked_add_signed(TimeDelta::try_days(1)?),
        RepeatKind::Weekly => from.checked_add_signed(TimeDelta::try_weeks(1)?),
        RepeatKind::Monthly => from.checked_add_months(Months::new(1)),
    }
}

/// Materialize every occurrence of `rule` that starts within the horizon.
///
/// The UTC offset stored in the rule is used for the whole series; it is not
/// re-resolved per occurrence, so a series that crosses a DST change keeps a
/// fixed UTC instant-of-day rather than a fixed wall-clock time.
pub fn expand(rule: &ScheduleRule) -> Result<Vec<Occurrence>> {
    validate(rule)?;
    let limit = horizon_limit(rule)?;
    let duration = rule.duration();

    let mut occurrences = Vec::new();
    let mut cursor = Some(rule.start);
    while let Some(start) = cursor.filter(|s| *s <= limit) {
        let end = start
            .checked_add_signed(duration)
            .ok_or_else(|| Error::invalid_rule("end time out of range"))?;
        occurrences.push(Occurrence {
            id: Ulid::new(),
            rule_id: rule.id,
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        });
        cursor = next_start(rule.repeat, start);
    }

    metrics::counter!(
        crate::observability::OCCURRENCES_EXPANDED_TOTAL,
        "repeat" => rule.repeat.as_str()
    )
    .increment(occurrences.len() as u64);
    Ok(occurrences)
}
