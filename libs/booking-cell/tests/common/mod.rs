#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};
use tokio::sync::mpsc;
use uuid::Uuid;

use booking_cell::{
    BookingCoordinator, BookingPolicy, BookingStore, EventPublisher, InMemoryBookingStore, ManualClock,
};
use shared_models::events::BookingEvent;
use slot_cell::{ExpansionConfig, SlotExpansionService, SlotStore, SlotSummary, TimeInterval, WeeklyTemplate};

// 2026-10-19 is a Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 12, 8, 0, 0).unwrap()
}

pub fn monday_morning_template() -> WeeklyTemplate {
    WeeklyTemplate::new([(Weekday::Mon, vec![TimeInterval::parse("09:00", "12:00").unwrap()])]).unwrap()
}

pub struct Fixture {
    pub store: Arc<InMemoryBookingStore>,
    pub clock: Arc<ManualClock>,
    pub coordinator: Arc<BookingCoordinator>,
    pub expansion: Arc<SlotExpansionService>,
    pub events: mpsc::Receiver<BookingEvent>,
    pub doctor_id: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_policy(BookingPolicy::default()).await
    }

    pub async fn with_policy(policy: BookingPolicy) -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let clock = Arc::new(ManualClock::new(start_of_test()));
        let (publisher, events) = EventPublisher::channel(64);
        let doctor_id = Uuid::new_v4();

        store.save_weekly_template(doctor_id, monday_morning_template()).await.unwrap();

        let booking_store: Arc<dyn BookingStore> = store.clone();
        let slot_store: Arc<dyn SlotStore> = store.clone();

        let coordinator = Arc::new(BookingCoordinator::with_clock(
            booking_store,
            publisher,
            policy,
            clock.clone(),
        ));
        let expansion = Arc::new(SlotExpansionService::new(slot_store, ExpansionConfig::default()));

        Self { store, clock, coordinator, expansion, events, doctor_id }
    }

    /// Expands Monday 09:00-12:00 and returns the six slots in start order.
    pub async fn expand_monday(&self) -> Vec<SlotSummary> {
        self.expansion
            .expand(self.doctor_id, monday(), monday() + Duration::days(1))
            .await
            .unwrap();
        self.coordinator
            .list_slots(self.doctor_id, monday(), monday() + Duration::days(1))
            .await
            .unwrap()
    }

    pub fn next_event(&mut self) -> Option<BookingEvent> {
        self.events.try_recv().ok()
    }
}
