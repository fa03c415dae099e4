use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::{Occurrence, RepeatKind, ScheduleCreated, ScheduleRule};
use crate::recurrence;
use crate::store::RuleStore;

/// A rule as it arrives from the outside: civil times in the school's timezone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleRequest {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// One of `ONCE`, `DAILY`, `WEEKLY`, `MONTHLY`.
    pub repeat: String,
}

/// Creates, replaces and deletes rules together with their occurrence series.
pub struct ScheduleService<S: RuleStore> {
    store: Arc<S>,
    timezone: Tz,
}

impl<S: RuleStore> ScheduleService<S> {
    pub fn new(store: Arc<S>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    /// Pin both civil times to the UTC offset the timezone has at `start`.
    fn anchor(
        &self,
        req: &ScheduleRequest,
    ) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let start = self
            .timezone
            .from_local_datetime(&req.start)
            .earliest()
            .ok_or_else(|| {
                Error::invalid_rule(format!("{} does not exist in {}", req.start, self.timezone))
            })?
            .fixed_offset();
        let end = start
            .offset()
            .from_local_datetime(&req.end)
            .single()
            .ok_or_else(|| Error::invalid_rule(format!("end {} out of range", req.end)))?;
        Ok((start, end))
    }

    fn build_rule(
        &self,
        id: Ulid,
        req: &ScheduleRequest,
    ) -> Result<(ScheduleRule, Vec<Occurrence>)> {
        let repeat: RepeatKind = req.repeat.parse()?;
        let (start, end) = self.anchor(req)?;
        let rule = ScheduleRule {
            id,
            start,
            end,
            repeat,
        };
        let occurrences = recurrence::expand(&rule)?;
        Ok((rule, occurrences))
    }

    pub async fn create_schedule(&self, req: ScheduleRequest) -> Result<ScheduleCreated> {
        let (rule, occurrences) = self.build_rule(Ulid::new(), &req)?;
        let repeat = rule.repeat;
        let rule_id = self
            .store
            .create_rule_and_occurrences(rule, occurrences.clone())
            .await?;
        tracing::info!(
            "schedule {rule_id} created: {repeat} from {}, {} occurrences",
            req.start,
            occurrences.len()
        );
        Ok(ScheduleCreated { rule_id, occurrences })
    }

    /// Re-expand an existing rule from new parameters, replacing its whole series.
    pub async fn update_schedule(
        &self,
        rule_id: Ulid,
        req: ScheduleRequest,
    ) -> Result<ScheduleCreated> {
        let (rule, occurrences) = self.build_rule(rule_id, &req)?;
        if self.store.find_rule(rule_id).await?.is_none() {
            return Err(Error::NotFound(rule_id));
        }
        self.store
            .replace_rule_and_occurrences(rule, occurrences.clone())
            .await?;
        tracing::info!("schedule {rule_id} replaced: {} occurrences", occurrences.len());
        Ok(ScheduleCreated { rule_id, occurrences })
    }

    pub async fn delete_schedule(&self, rule_id: Ulid) -> Result<()> {
        self.store.delete_rule(rule_id).await?;
        tracing::info!("schedule {rule_id} deleted");
        Ok(())
    }

    pub async fn get_schedule(&self, rule_id: Ulid) -> Result<ScheduleRule> {
        self.store
            .find_rule(rule_id)
            .await?
            .ok_or(Error::NotFound(rule_id))
    }

    pub async fn occurrences(&self, rule_id: Ulid) -> Result<Vec<Occurrence>> {
        self.store.find_occurrences_by_rule_id(rule_id).await
    }
}
