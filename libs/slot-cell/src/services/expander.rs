use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::SlotError;
use crate::models::{Slot, SlotSummary, WeeklyTemplate};
use crate::services::store::SlotStore;

#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    pub slot_duration: Duration,
    pub utc_offset: FixedOffset,
    pub max_range_days: i64,
}

impl ExpansionConfig {
    pub fn new(slot_duration_minutes: i64, utc_offset_minutes: i32, max_range_days: i64) -> Result<Self, SlotError> {
        if slot_duration_minutes <= 0 || slot_duration_minutes > 24 * 60 {
            return Err(SlotError::Configuration(format!(
                "slot duration must be between 1 and 1440 minutes, got {}",
                slot_duration_minutes
            )));
        }
        if max_range_days <= 0 {
            return Err(SlotError::Configuration("max expansion range must be positive".to_string()));
        }
        let utc_offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                SlotError::Configuration(format!("invalid UTC offset of {} minutes", utc_offset_minutes))
            })?;

        Ok(Self {
            slot_duration: Duration::minutes(slot_duration_minutes),
            utc_offset,
            max_range_days,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, SlotError> {
        Self::new(
            config.slot_duration_minutes,
            config.schedule_utc_offset_minutes,
            config.max_expansion_days,
        )
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            slot_duration: Duration::minutes(30),
            utc_offset: FixedOffset::east_opt(0).unwrap_or_else(|| Utc.fix()),
            max_range_days: 90,
        }
    }
}

/// Partitions every template interval on each date of `[from, to)` into
/// consecutive fixed-length slots. A remainder shorter than one slot is dropped.
pub fn expand_template(
    doctor_id: Uuid,
    template: &WeeklyTemplate,
    from: NaiveDate,
    to: NaiveDate,
    config: &ExpansionConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, SlotError> {
    validate_range(from, to, config)?;

    let mut slots = Vec::new();
    for date in from.iter_days().take_while(|date| *date < to) {
        for interval in template.intervals_on(date) {
            let window_end = date.and_time(interval.end());
            let mut cursor = date.and_time(interval.start());

            while cursor + config.slot_duration <= window_end {
                let start = to_utc(&config.utc_offset, cursor)?;
                let end = to_utc(&config.utc_offset, cursor + config.slot_duration)?;
                slots.push(Slot::new_available(doctor_id, date, start, end, now));
                cursor += config.slot_duration;
            }
        }
    }

    debug!("Expanded template for doctor {} into {} candidate slots ({} to {})",
           doctor_id, slots.len(), from, to);
    Ok(slots)
}

fn validate_range(from: NaiveDate, to: NaiveDate, config: &ExpansionConfig) -> Result<(), SlotError> {
    if from >= to {
        return Err(SlotError::InvalidRange(format!("from {} must be before to {}", from, to)));
    }
    let days = (to - from).num_days();
    if days > config.max_range_days {
        return Err(SlotError::InvalidRange(format!(
            "range of {} days exceeds the maximum of {}",
            days, config.max_range_days
        )));
    }
    Ok(())
}

fn to_utc(offset: &FixedOffset, local: chrono::NaiveDateTime) -> Result<DateTime<Utc>, SlotError> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SlotError::Configuration(format!("cannot place {} in offset {}", local, offset)))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionOutcome {
    pub doctor_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub candidates: usize,
    pub created: Vec<SlotSummary>,
}

/// Materializes slots from the stored weekly template.
pub struct SlotExpansionService {
    store: Arc<dyn SlotStore>,
    config: ExpansionConfig,
}

impl SlotExpansionService {
    pub fn new(store: Arc<dyn SlotStore>, config: ExpansionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub async fn save_template(&self, doctor_id: Uuid, template: WeeklyTemplate) -> Result<(), SlotError> {
        self.store.save_weekly_template(doctor_id, template).await?;
        info!("Saved weekly schedule for doctor {}", doctor_id);
        Ok(())
    }

    /// Idempotent: only slots missing from the store are created, as AVAILABLE.
    pub async fn expand(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ExpansionOutcome, SlotError> {
        validate_range(from, to, &self.config)?;

        let template = self
            .store
            .get_weekly_template(doctor_id)
            .await?
            .ok_or_else(|| SlotError::NotFound(format!("no weekly schedule for doctor {}", doctor_id)))?;

        self.expand_with_template(doctor_id, &template, from, to).await
    }

    pub async fn expand_with_template(
        &self,
        doctor_id: Uuid,
        template: &WeeklyTemplate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ExpansionOutcome, SlotError> {
        let candidates = expand_template(doctor_id, template, from, to, &self.config, Utc::now())?;
        let candidate_count = candidates.len();

        let created = if candidates.is_empty() {
            Vec::new()
        } else {
            self.store.insert_missing_slots(candidates).await?
        };

        info!("Expanded schedule for doctor {} ({} to {}): {} candidates, {} created",
              doctor_id, from, to, candidate_count, created.len());

        Ok(ExpansionOutcome {
            doctor_id,
            from,
            to,
            candidates: candidate_count,
            created: created.iter().map(Slot::summary).collect(),
        })
    }
}
