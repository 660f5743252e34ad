use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::SlotError;
use crate::models::{Slot, WeeklyTemplate};
use crate::services::state_machine::SlotTransition;

/// Durable slot storage with a compare-and-transition primitive.
///
/// `transition_slot` must evaluate the [`SlotStateMachine`](crate::SlotStateMachine)
/// guard and write the result as one atomic step, so that of any number of
/// concurrent callers on the same slot only those whose guard still holds at
/// write time succeed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, SlotError>;

    /// Slots of one doctor with `from <= date < to`, ordered by start time.
    async fn list_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError>;

    async fn get_weekly_template(&self, doctor_id: Uuid) -> Result<Option<WeeklyTemplate>, SlotError>;

    /// Replaces the doctor's template. Slots already materialized stay as they are.
    async fn save_weekly_template(&self, doctor_id: Uuid, template: WeeklyTemplate) -> Result<(), SlotError>;

    /// Inserts slots whose (doctor, date, start) key does not exist yet and
    /// returns only the newly created ones. Existing slots are never touched.
    async fn insert_missing_slots(&self, slots: Vec<Slot>) -> Result<Vec<Slot>, SlotError>;

    async fn transition_slot(
        &self,
        slot_id: Uuid,
        transition: SlotTransition,
        now: DateTime<Utc>,
    ) -> Result<Slot, SlotError>;

    /// Applies [`SlotTransition::Expire`] to every held slot whose hold deadline has passed.
    async fn expire_holds(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, SlotError>;
}
