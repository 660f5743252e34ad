mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use futures::future::join_all;
use uuid::Uuid;

use booking_cell::{
    AppointmentStatus, BookingError, BookingPolicy, BookingStore, ConfirmBooking, PaymentMethod,
};
use shared_models::events::BookingEvent;
use slot_cell::{SlotStatus, SlotStore};

use common::Fixture;

fn confirm(patient_id: Uuid, slot_id: Uuid, hold_token: Uuid) -> ConfirmBooking {
    ConfirmBooking {
        slot_id,
        patient_id,
        hold_token,
        payment_method: PaymentMethod::Offline,
        transaction_id: None,
        notes: None,
    }
}

#[tokio::test]
async fn concurrent_holds_have_exactly_one_winner() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let target = slots[0].id;

    let attempts = (0..16).map(|_| {
        let coordinator = fixture.coordinator.clone();
        tokio::spawn(async move { coordinator.request_hold(target, Uuid::new_v4()).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(BookingError::StateConflict(msg)) if msg == "slot no longer available");
    }

    let slot = fixture.store.get_slot(target).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Held);
}

#[tokio::test]
async fn confirm_creates_confirmed_appointment_and_notifies_doctor() {
    let mut fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();

    let grant = fixture.coordinator.request_hold(slots[1].id, patient).await.unwrap();
    assert_eq!(grant.expires_at, common::start_of_test() + Duration::seconds(300));

    let appointment = fixture
        .coordinator
        .confirm_booking(ConfirmBooking {
            payment_method: PaymentMethod::Online,
            transaction_id: Some("txn-42".to_string()),
            ..confirm(patient, slots[1].id, grant.hold_token)
        })
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
    assert_eq!(appointment.patient_id, patient);
    assert_eq!(appointment.doctor_id, fixture.doctor_id);
    assert_eq!(appointment.transaction_id.as_deref(), Some("txn-42"));

    let slot = fixture.store.get_slot(slots[1].id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Booked);
    assert_eq!(slot.appointment_id, Some(appointment.id));
    assert_eq!(slot.hold_token, None);

    assert_matches!(
        fixture.next_event(),
        Some(BookingEvent::BookingConfirmed { appointment_id, doctor_id, patient_id, .. })
            if appointment_id == appointment.id && doctor_id == fixture.doctor_id && patient_id == patient
    );
}

#[tokio::test]
async fn stale_token_never_changes_the_slot() {
    let mut fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[0].id, patient).await.unwrap();
    let before = fixture.store.get_slot(slots[0].id).await.unwrap().unwrap();

    let result = fixture.coordinator.confirm_booking(confirm(patient, slots[0].id, Uuid::new_v4())).await;
    assert_matches!(result, Err(BookingError::StateConflict(_)));

    // Even once the hold has lapsed a wrong token must not reclaim it
    fixture.clock.advance(Duration::minutes(10));
    let result = fixture.coordinator.confirm_booking(confirm(patient, slots[0].id, Uuid::new_v4())).await;
    assert_matches!(result, Err(BookingError::StateConflict(_)));

    let after = fixture.store.get_slot(slots[0].id).await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(after.hold_token, Some(grant.hold_token));
    assert_eq!(fixture.store.appointment_count().await, 0);
    assert!(fixture.next_event().is_none());
}

#[tokio::test]
async fn confirm_after_ttl_is_expired_and_slot_is_available_again() {
    let mut fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[2].id, patient).await.unwrap();

    fixture.clock.advance(Duration::seconds(301));

    let result = fixture.coordinator.confirm_booking(confirm(patient, slots[2].id, grant.hold_token)).await;
    assert_matches!(result, Err(BookingError::Expired));

    let slot = fixture.store.get_slot(slots[2].id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Available);
    assert_eq!(slot.hold_token, None);
    assert_eq!(fixture.store.appointment_count().await, 0);
    assert!(fixture.next_event().is_none());

    // Someone else can take it now
    let other = Uuid::new_v4();
    fixture.coordinator.request_hold(slots[2].id, other).await.unwrap();
}

#[tokio::test]
async fn hold_on_missing_slot_is_not_found() {
    let fixture = Fixture::new().await;
    let result = fixture.coordinator.request_hold(Uuid::new_v4(), Uuid::new_v4()).await;
    assert_matches!(result, Err(BookingError::NotFound(_)));
}

#[tokio::test]
async fn release_hold_returns_slot_to_available() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[3].id, patient).await.unwrap();

    assert_matches!(
        fixture.coordinator.release_hold(slots[3].id, Uuid::new_v4()).await,
        Err(BookingError::StateConflict(_))
    );

    let slot = fixture.coordinator.release_hold(slots[3].id, grant.hold_token).await.unwrap();
    assert_eq!(slot.status, SlotStatus::Available);

    assert_matches!(
        fixture.coordinator.confirm_booking(confirm(patient, slots[3].id, grant.hold_token)).await,
        Err(BookingError::StateConflict(_))
    );
}

#[tokio::test]
async fn cancel_is_limited_to_participants_and_notifies_both() {
    let mut fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[0].id, patient).await.unwrap();
    let appointment = fixture
        .coordinator
        .confirm_booking(confirm(patient, slots[0].id, grant.hold_token))
        .await
        .unwrap();
    fixture.next_event();

    assert_matches!(
        fixture.coordinator.cancel_appointment(appointment.id, Uuid::new_v4()).await,
        Err(BookingError::Forbidden(_))
    );
    assert_matches!(
        fixture.coordinator.cancel_appointment(Uuid::new_v4(), patient).await,
        Err(BookingError::NotFound(_))
    );

    let cancelled = fixture.coordinator.cancel_appointment(appointment.id, fixture.doctor_id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let slot = fixture.store.get_slot(slots[0].id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Cancelled);

    let event = fixture.next_event().unwrap();
    assert_eq!(event.recipients(), vec![patient, fixture.doctor_id]);
    assert_matches!(event, BookingEvent::BookingCancelled { cancelled_by, .. } if cancelled_by == fixture.doctor_id);

    assert_matches!(
        fixture.coordinator.cancel_appointment(appointment.id, patient).await,
        Err(BookingError::StateConflict(_))
    );
}

#[tokio::test]
async fn reopen_policy_returns_cancelled_slot_to_available() {
    let fixture = Fixture::with_policy(BookingPolicy {
        reopen_cancelled_slots: true,
        ..BookingPolicy::default()
    })
    .await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[4].id, patient).await.unwrap();
    let appointment = fixture
        .coordinator
        .confirm_booking(confirm(patient, slots[4].id, grant.hold_token))
        .await
        .unwrap();

    fixture.coordinator.cancel_appointment(appointment.id, patient).await.unwrap();

    let slot = fixture.store.get_slot(slots[4].id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Available);
    assert_eq!(slot.appointment_id, None);
}

#[tokio::test]
async fn doctor_slot_management_requires_ownership() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;

    assert_matches!(
        fixture.coordinator.block_slot(slots[5].id, Uuid::new_v4()).await,
        Err(BookingError::Forbidden(_))
    );

    let blocked = fixture.coordinator.block_slot(slots[5].id, fixture.doctor_id).await.unwrap();
    assert_eq!(blocked.status, SlotStatus::Unavailable);
    assert_matches!(
        fixture.coordinator.request_hold(slots[5].id, Uuid::new_v4()).await,
        Err(BookingError::StateConflict(_))
    );

    let unblocked = fixture.coordinator.unblock_slot(slots[5].id, fixture.doctor_id).await.unwrap();
    assert_eq!(unblocked.status, SlotStatus::Available);

    assert_matches!(
        fixture.coordinator.reopen_slot(slots[5].id, fixture.doctor_id).await,
        Err(BookingError::StateConflict(_))
    );
}

#[tokio::test]
async fn appointment_status_follows_lifecycle_table() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[0].id, patient).await.unwrap();
    let appointment = fixture
        .coordinator
        .confirm_booking(confirm(patient, slots[0].id, grant.hold_token))
        .await
        .unwrap();

    assert_matches!(
        fixture
            .coordinator
            .update_appointment_status(appointment.id, AppointmentStatus::Cancelled, fixture.doctor_id)
            .await,
        Err(BookingError::Validation(_))
    );
    assert_matches!(
        fixture
            .coordinator
            .update_appointment_status(appointment.id, AppointmentStatus::Pending, fixture.doctor_id)
            .await,
        Err(BookingError::StateConflict(_))
    );

    // Only the doctor records outcomes
    assert_matches!(
        fixture
            .coordinator
            .update_appointment_status(appointment.id, AppointmentStatus::Completed, patient)
            .await,
        Err(BookingError::Forbidden(_))
    );
    assert_eq!(
        fixture.store.get_appointment(appointment.id).await.unwrap().unwrap().status,
        AppointmentStatus::Confirmed
    );

    let completed = fixture
        .coordinator
        .update_appointment_status(appointment.id, AppointmentStatus::Completed, fixture.doctor_id)
        .await
        .unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);

    assert_matches!(
        fixture.coordinator.cancel_appointment(appointment.id, patient).await,
        Err(BookingError::StateConflict(_))
    );

    let fetched = fixture.coordinator.get_appointment(appointment.id, patient).await.unwrap();
    assert_eq!(fetched.status, AppointmentStatus::Completed);
    assert_matches!(
        fixture.coordinator.get_appointment(appointment.id, Uuid::new_v4()).await,
        Err(BookingError::Forbidden(_))
    );
}

#[tokio::test]
async fn storage_outage_applies_nothing() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;

    fixture.store.set_unavailable(true);
    assert_matches!(
        fixture.coordinator.request_hold(slots[0].id, Uuid::new_v4()).await,
        Err(BookingError::StorageUnavailable(_))
    );
    fixture.store.set_unavailable(false);

    let slot = fixture.store.get_slot(slots[0].id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Available);
}

#[tokio::test]
async fn expansion_is_idempotent_and_leaves_existing_slots_alone() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    assert_eq!(slots.len(), 6);

    let grant = fixture.coordinator.request_hold(slots[0].id, Uuid::new_v4()).await.unwrap();

    let again = fixture
        .expansion
        .expand(fixture.doctor_id, common::monday(), common::monday() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(again.candidates, 6);
    assert!(again.created.is_empty());
    assert_eq!(fixture.store.slot_count().await, 6);

    let held = fixture.store.get_slot(slots[0].id).await.unwrap().unwrap();
    assert_eq!(held.hold_token, Some(grant.hold_token));
}

#[tokio::test]
async fn only_the_holder_can_confirm() {
    let mut fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let holder = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[0].id, holder).await.unwrap();

    let result = fixture.coordinator.confirm_booking(confirm(stranger, slots[0].id, grant.hold_token)).await;
    assert_matches!(result, Err(BookingError::StateConflict(msg)) if msg == "hold belongs to another patient");

    let slot = fixture.store.get_slot(slots[0].id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Held);
    assert_eq!(slot.held_by, Some(holder));
    assert_eq!(fixture.store.appointment_count().await, 0);
    assert!(fixture.next_event().is_none());

    // The store enforces the same rule when called directly
    let direct = fixture
        .store
        .confirm_booking(
            slots[0].id,
            grant.hold_token,
            booking_cell::NewAppointment {
                id: Uuid::new_v4(),
                patient_id: stranger,
                doctor_id: fixture.doctor_id,
                slot_id: slots[0].id,
                payment_method: PaymentMethod::Offline,
                transaction_id: None,
                notes: None,
            },
            common::start_of_test(),
        )
        .await;
    assert_matches!(direct, Err(BookingError::StateConflict(_)));

    let appointment = fixture
        .coordinator
        .confirm_booking(confirm(holder, slots[0].id, grant.hold_token))
        .await
        .unwrap();
    assert_eq!(appointment.patient_id, holder);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_with_one_token_book_once() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let patient = Uuid::new_v4();
    let grant = fixture.coordinator.request_hold(slots[0].id, patient).await.unwrap();

    let attempts = (0..8).map(|_| {
        let coordinator = fixture.coordinator.clone();
        let request = confirm(patient, slots[0].id, grant.hold_token);
        tokio::spawn(async move { coordinator.confirm_booking(request).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(BookingError::StateConflict(_)));
    }
    assert_eq!(fixture.store.appointment_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeper_and_confirm_never_double_release_or_lose_a_booking() {
    let fixture = Fixture::new().await;
    let slots = fixture.expand_monday().await;
    let store: std::sync::Arc<dyn SlotStore> = fixture.store.clone();
    let sweeper = std::sync::Arc::new(booking_cell::HoldExpirySweeper::with_clock(
        store,
        std::time::Duration::from_secs(30),
        fixture.clock.clone(),
    ));

    // Each round holds two slots, moves the clock to one side of the
    // deadline and lets their confirms race a sweep.
    let offsets = [Duration::seconds(-1), Duration::zero(), Duration::seconds(1)];
    for (offset, round) in offsets.into_iter().zip(slots.chunks(2)) {
        fixture.clock.set(common::start_of_test());
        let mut grants = Vec::new();
        for slot in round {
            let patient = Uuid::new_v4();
            let grant = fixture.coordinator.request_hold(slot.id, patient).await.unwrap();
            grants.push((patient, grant));
        }
        let deadline = grants[0].1.expires_at;
        fixture.clock.set(deadline + offset);

        let sweep = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.sweep_once().await })
        };
        let confirms = grants.iter().map(|(patient, grant)| {
            let coordinator = fixture.coordinator.clone();
            let request = confirm(*patient, grant.slot_id, grant.hold_token);
            tokio::spawn(async move { coordinator.confirm_booking(request).await })
        });
        let outcomes: Vec<_> = join_all(confirms).await.into_iter().map(|r| r.unwrap()).collect();
        let released = sweep.await.unwrap().unwrap();

        for ((_, grant), outcome) in grants.iter().zip(&outcomes) {
            let slot = fixture.store.get_slot(grant.slot_id).await.unwrap().unwrap();
            let swept = released.iter().filter(|s| s.id == grant.slot_id).count();
            match outcome {
                Ok(appointment) => {
                    assert_eq!(slot.status, SlotStatus::Booked);
                    assert_eq!(slot.appointment_id, Some(appointment.id));
                    assert_eq!(swept, 0, "a booked slot was also released");
                }
                Err(BookingError::Expired) | Err(BookingError::StateConflict(_)) => {
                    assert_eq!(slot.status, SlotStatus::Available);
                    assert!(swept <= 1);
                }
                Err(other) => panic!("unexpected confirm outcome: {other:?}"),
            }
        }
    }

    // No slot may end up BOOKED without its appointment row
    for slot in fixture.store.list_slots(fixture.doctor_id, common::monday(), common::monday() + Duration::days(1)).await.unwrap() {
        if slot.status == SlotStatus::Booked {
            let appointment_id = slot.appointment_id.expect("booked slot without appointment id");
            let appointment = fixture.store.get_appointment(appointment_id).await.unwrap();
            assert!(appointment.is_some());
        }
    }
}
