use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use booking_cell::ManualClock;
use shared_models::events::BookingEvent;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use slot_booking_api::{create_router, AppServices, Stores};

// 2026-10-19 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

struct Harness {
    services: AppServices,
    events: mpsc::Receiver<BookingEvent>,
    clock: Arc<ManualClock>,
    config: TestConfig,
    app: Router,
    doctor: TestUser,
}

impl Harness {
    fn new() -> Self {
        let config = TestConfig::default();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 12, 8, 0, 0).unwrap()));
        let (services, events) =
            AppServices::with_clock(config.to_arc(), Stores::in_memory(), clock.clone()).unwrap();
        let app = create_router(&services);

        Self {
            services,
            events,
            clock,
            config,
            app,
            doctor: TestUser::doctor("doctor@example.com"),
        }
    }

    async fn send(&self, method: &str, uri: &str, user: Option<&TestUser>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("Authorization", JwtTestUtils::bearer(user, &self.config));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    /// Saves Monday 09:00-12:00 and expands it; returns the slot ids in start order.
    async fn publish_monday(&self) -> Vec<Uuid> {
        let (status, _) = self
            .send(
                "PUT",
                &format!("/slots/schedule/{}", self.doctor.uuid()),
                Some(&self.doctor),
                Some(json!({ "monday": [{ "start": "09:00", "end": "12:00" }] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .send(
                "POST",
                "/slots/expand",
                Some(&self.doctor),
                Some(json!({ "doctorId": self.doctor.uuid(), "from": monday(), "to": monday() + Duration::days(1) })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created"], 6);

        self.list_slots()
            .await
            .iter()
            .map(|slot| slot["id"].as_str().unwrap().parse().unwrap())
            .collect()
    }

    async fn list_slots(&self) -> Vec<Value> {
        let uri = format!(
            "/slots?doctorId={}&from={}&to={}",
            self.doctor.uuid(),
            monday(),
            monday() + Duration::days(1)
        );
        let (status, body) = self.send("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().unwrap().clone()
    }

    async fn hold(&self, patient: &TestUser, slot_id: Uuid) -> (StatusCode, Value) {
        self.send("POST", "/bookings/hold", Some(patient), Some(json!({ "slotId": slot_id }))).await
    }

    /// Feeds every queued event through the dispatcher, as the background task would.
    async fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.services.dispatcher.dispatch(event).await;
            handled += 1;
        }
        handled
    }

    async fn unread(&self, user: &TestUser) -> Vec<Value> {
        let (status, body) = self.send("GET", "/notifications/unread", Some(user), None).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().unwrap().clone()
    }
}

#[tokio::test]
async fn health_route_answers() {
    let harness = Harness::new();
    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn monday_morning_is_booked_and_cancelled() {
    let mut harness = Harness::new();
    let slots = harness.publish_monday().await;
    assert_eq!(slots.len(), 6);

    let first = TestUser::patient("first@example.com");
    let second = TestUser::patient("second@example.com");
    let slot = slots[0];

    let (status, grant) = harness.hold(&first, slot).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = harness.hold(&second, slot).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, confirmed) = harness
        .send(
            "POST",
            "/bookings/confirm",
            Some(&first),
            Some(json!({ "slotId": slot, "holdToken": grant["holdToken"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(confirmed["status"], "CONFIRMED");

    let listed = harness.list_slots().await;
    assert_eq!(listed[0]["status"], "BOOKED");
    assert!(listed[1..].iter().all(|s| s["status"] == "AVAILABLE"));

    assert_eq!(harness.drain_events().await, 1);
    let doctor_inbox = harness.unread(&harness.doctor).await;
    assert_eq!(doctor_inbox.len(), 1);
    assert_eq!(doctor_inbox[0]["message"], "New appointment booking for 2026-10-19 at 09:00");

    let (status, cancelled) = harness
        .send(
            "POST",
            "/bookings/cancel",
            Some(&harness.doctor),
            Some(json!({ "appointmentId": confirmed["appointmentId"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    assert_eq!(harness.drain_events().await, 1);
    assert_eq!(harness.unread(&harness.doctor).await.len(), 2);
    let patient_inbox = harness.unread(&first).await;
    assert_eq!(patient_inbox.len(), 1);
    assert_eq!(patient_inbox[0]["message"], "Appointment on 2026-10-19 at 09:00 was cancelled");
    assert!(harness.unread(&second).await.is_empty());

    // Cancellation leaves the slot out of circulation by default
    assert_eq!(harness.list_slots().await[0]["status"], "CANCELLED");
}

#[tokio::test]
async fn expired_hold_is_gone_and_slot_returns() {
    let harness = Harness::new();
    let slots = harness.publish_monday().await;
    let patient = TestUser::patient("late@example.com");

    let (status, grant) = harness.hold(&patient, slots[1]).await;
    assert_eq!(status, StatusCode::CREATED);

    harness.clock.advance(Duration::seconds(301));

    let (status, body) = harness
        .send(
            "POST",
            "/bookings/confirm",
            Some(&patient),
            Some(json!({ "slotId": slots[1], "holdToken": grant["holdToken"] })),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert!(body["error"].is_string());
    assert_eq!(harness.list_slots().await[1]["status"], "AVAILABLE");

    // Someone else can take it now
    let (status, _) = harness.hold(&TestUser::patient("next@example.com"), slots[1]).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn sweeper_releases_abandoned_holds() {
    let harness = Harness::new();
    let slots = harness.publish_monday().await;

    for slot in &slots[..3] {
        let (status, _) = harness.hold(&TestUser::patient("idle@example.com"), *slot).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let sweeper = harness.services.sweeper();
    assert!(sweeper.sweep_once().await.unwrap().is_empty());

    harness.clock.advance(Duration::minutes(10));
    assert_eq!(sweeper.sweep_once().await.unwrap().len(), 3);
    assert!(harness.list_slots().await.iter().all(|slot| slot["status"] == "AVAILABLE"));
}

#[tokio::test]
async fn background_tasks_stop_cleanly() {
    let harness = Harness::new();
    let Harness { services, events, app, .. } = harness;

    let background = services.spawn_background(events);
    // The routers hold the last event senders along with the services.
    drop(app);
    drop(services);
    tokio::time::timeout(std::time::Duration::from_secs(5), background.shutdown())
        .await
        .expect("background tasks did not stop");
}
