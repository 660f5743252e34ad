use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SlotError;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Held,
    Booked,
    Unavailable,
    Cancelled,
}

impl SlotStatus {
    /// Edge table of the slot lifecycle. Every write path goes through this.
    pub fn can_transition_to(&self, target: &SlotStatus) -> bool {
        use SlotStatus::*;
        matches!(
            (self, target),
            (Available, Held)
                | (Held, Booked)
                | (Held, Available)
                | (Available, Unavailable)
                | (Unavailable, Available)
                | (Booked, Cancelled)
                | (Cancelled, Available)
        )
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "AVAILABLE"),
            SlotStatus::Held => write!(f, "HELD"),
            SlotStatus::Booked => write!(f, "BOOKED"),
            SlotStatus::Unavailable => write!(f, "UNAVAILABLE"),
            SlotStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One bookable unit of a doctor's time. Stored as a row of the `slots` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    #[serde(default)]
    pub hold_token: Option<Uuid>,
    #[serde(default)]
    pub held_by: Option<Uuid>,
    #[serde(default)]
    pub hold_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn new_available(
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            date,
            start_time,
            end_time,
            status: SlotStatus::Available,
            hold_token: None,
            held_by: None,
            hold_expires_at: None,
            appointment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
        }
    }

    pub fn is_hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Held
            && self.hold_expires_at.map_or(true, |expires_at| expires_at <= now)
    }

    pub fn summary(&self) -> SlotSummary {
        SlotSummary {
            id: self.id,
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
        }
    }
}

/// Natural identity of a slot; expansion never creates two slots with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
}

/// Read-only listing representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
}

// ==============================================================================
// WEEKLY TEMPLATE
// ==============================================================================

/// A working window within one day, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct TimeInterval {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeInterval {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, SlotError> {
        if start >= end {
            return Err(SlotError::InvalidTemplate(format!(
                "interval start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, SlotError> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInterval {
    start: String,
    end: String,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = SlotError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::parse(&raw.start, &raw.end)
    }
}

impl From<TimeInterval> for RawInterval {
    fn from(interval: TimeInterval) -> Self {
        Self {
            start: interval.start.format("%H:%M").to_string(),
            end: interval.end.format("%H:%M").to_string(),
        }
    }
}

fn parse_clock(value: &str) -> Result<NaiveTime, SlotError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| SlotError::InvalidTemplate(format!("invalid time of day '{}'", value)))
}

/// A doctor's recurring availability: per weekday, sorted non-overlapping intervals.
///
/// Construction is the only place the invariants are checked, so a value of
/// this type can be expanded without re-validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWeeklySchedule", into = "RawWeeklySchedule")]
pub struct WeeklyTemplate {
    days: [Vec<TimeInterval>; 7],
}

impl WeeklyTemplate {
    pub fn new<I>(days: I) -> Result<Self, SlotError>
    where
        I: IntoIterator<Item = (Weekday, Vec<TimeInterval>)>,
    {
        let mut template = Self::default();
        for (weekday, intervals) in days {
            template.days[weekday.num_days_from_monday() as usize].extend(intervals);
        }

        for (index, intervals) in template.days.iter_mut().enumerate() {
            intervals.sort_by_key(|interval| interval.start);
            if let Some(pair) = intervals.windows(2).find(|pair| pair[1].start < pair[0].end) {
                return Err(SlotError::InvalidTemplate(format!(
                    "overlapping intervals on {}: {}-{} and {}-{}",
                    weekday_name(index),
                    pair[0].start.format("%H:%M"),
                    pair[0].end.format("%H:%M"),
                    pair[1].start.format("%H:%M"),
                    pair[1].end.format("%H:%M"),
                )));
            }
        }

        Ok(template)
    }

    pub fn intervals_for(&self, weekday: Weekday) -> &[TimeInterval] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn intervals_on(&self, date: NaiveDate) -> &[TimeInterval] {
        self.intervals_for(date.weekday())
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }
}

const WEEKDAY_NAMES: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

fn weekday_name(index: usize) -> &'static str {
    WEEKDAY_NAMES[index]
}

/// Wire form of the `schedules.weekly_schedule` JSON column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWeeklySchedule {
    pub monday: Vec<TimeInterval>,
    pub tuesday: Vec<TimeInterval>,
    pub wednesday: Vec<TimeInterval>,
    pub thursday: Vec<TimeInterval>,
    pub friday: Vec<TimeInterval>,
    pub saturday: Vec<TimeInterval>,
    pub sunday: Vec<TimeInterval>,
}

impl TryFrom<RawWeeklySchedule> for WeeklyTemplate {
    type Error = SlotError;

    fn try_from(raw: RawWeeklySchedule) -> Result<Self, Self::Error> {
        WeeklyTemplate::new([
            (Weekday::Mon, raw.monday),
            (Weekday::Tue, raw.tuesday),
            (Weekday::Wed, raw.wednesday),
            (Weekday::Thu, raw.thursday),
            (Weekday::Fri, raw.friday),
            (Weekday::Sat, raw.saturday),
            (Weekday::Sun, raw.sunday),
        ])
    }
}

impl From<WeeklyTemplate> for RawWeeklySchedule {
    fn from(template: WeeklyTemplate) -> Self {
        let [monday, tuesday, wednesday, thursday, friday, saturday, sunday] = template.days;
        Self { monday, tuesday, wednesday, thursday, friday, saturday, sunday }
    }
}
