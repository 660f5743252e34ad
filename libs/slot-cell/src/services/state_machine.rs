use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::SlotError;
use crate::models::{Slot, SlotStatus};

/// A requested edge of the slot lifecycle together with the data its guard needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotTransition {
    Hold { holder: Uuid, token: Uuid, expires_at: DateTime<Utc> },
    Book { token: Uuid, patient: Uuid, appointment_id: Uuid },
    Release { token: Uuid },
    Expire,
    Block,
    Unblock,
    Cancel { appointment_id: Uuid },
    Reopen,
}

impl SlotTransition {
    pub fn from_status(&self) -> SlotStatus {
        match self {
            SlotTransition::Hold { .. } | SlotTransition::Block => SlotStatus::Available,
            SlotTransition::Book { .. } | SlotTransition::Release { .. } | SlotTransition::Expire => {
                SlotStatus::Held
            }
            SlotTransition::Unblock => SlotStatus::Unavailable,
            SlotTransition::Cancel { .. } => SlotStatus::Booked,
            SlotTransition::Reopen => SlotStatus::Cancelled,
        }
    }

    pub fn to_status(&self) -> SlotStatus {
        match self {
            SlotTransition::Hold { .. } => SlotStatus::Held,
            SlotTransition::Book { .. } => SlotStatus::Booked,
            SlotTransition::Release { .. }
            | SlotTransition::Expire
            | SlotTransition::Unblock
            | SlotTransition::Reopen => SlotStatus::Available,
            SlotTransition::Block => SlotStatus::Unavailable,
            SlotTransition::Cancel { .. } => SlotStatus::Cancelled,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SlotTransition::Hold { .. } => "hold",
            SlotTransition::Book { .. } => "book",
            SlotTransition::Release { .. } => "release",
            SlotTransition::Expire => "expire",
            SlotTransition::Block => "block",
            SlotTransition::Unblock => "unblock",
            SlotTransition::Cancel { .. } => "cancel",
            SlotTransition::Reopen => "reopen",
        }
    }
}

/// Pure guard for slot transitions.
///
/// Stores call [`SlotStateMachine::apply`] inside their atomic unit of work
/// (a write lock, or the equivalent conditional `UPDATE ... WHERE`), so a
/// failed guard never leaves a partially modified slot behind.
pub struct SlotStateMachine;

impl SlotStateMachine {
    pub fn apply(
        slot: &Slot,
        transition: &SlotTransition,
        now: DateTime<Utc>,
    ) -> Result<Slot, SlotError> {
        let from = transition.from_status();
        let to = transition.to_status();
        debug_assert!(from.can_transition_to(&to));

        if slot.status != from {
            debug!("Rejected {} on slot {} in state {}", transition.name(), slot.id, slot.status);
            return Err(Self::status_conflict(slot, transition));
        }

        let mut next = slot.clone();
        next.status = to;
        next.updated_at = now;

        match transition {
            SlotTransition::Hold { holder, token, expires_at } => {
                next.hold_token = Some(*token);
                next.held_by = Some(*holder);
                next.hold_expires_at = Some(*expires_at);
                next.appointment_id = None;
            }
            SlotTransition::Book { token, patient, appointment_id } => {
                Self::check_token(slot, token)?;
                if slot.held_by != Some(*patient) {
                    return Err(SlotError::StateConflict("hold belongs to another patient".to_string()));
                }
                if slot.is_hold_expired(now) {
                    return Err(SlotError::Expired);
                }
                Self::clear_hold(&mut next);
                next.appointment_id = Some(*appointment_id);
            }
            SlotTransition::Release { token } => {
                Self::check_token(slot, token)?;
                Self::clear_hold(&mut next);
            }
            SlotTransition::Expire => {
                if !slot.is_hold_expired(now) {
                    return Err(SlotError::StateConflict("hold has not expired".to_string()));
                }
                Self::clear_hold(&mut next);
            }
            SlotTransition::Cancel { appointment_id } => {
                if slot.appointment_id != Some(*appointment_id) {
                    return Err(SlotError::StateConflict(
                        "slot is booked by a different appointment".to_string(),
                    ));
                }
            }
            SlotTransition::Reopen => {
                next.appointment_id = None;
            }
            SlotTransition::Block | SlotTransition::Unblock => {}
        }

        Ok(next)
    }

    fn check_token(slot: &Slot, token: &Uuid) -> Result<(), SlotError> {
        if slot.hold_token.as_ref() != Some(token) {
            return Err(SlotError::StateConflict("hold token does not match".to_string()));
        }
        Ok(())
    }

    fn clear_hold(slot: &mut Slot) {
        slot.hold_token = None;
        slot.held_by = None;
        slot.hold_expires_at = None;
    }

    fn status_conflict(slot: &Slot, transition: &SlotTransition) -> SlotError {
        match transition {
            SlotTransition::Hold { .. } => {
                SlotError::StateConflict("slot no longer available".to_string())
            }
            SlotTransition::Book { .. } | SlotTransition::Release { .. } => {
                SlotError::StateConflict("slot is not held".to_string())
            }
            _ => SlotError::StateConflict(format!(
                "cannot {} a slot in {} state",
                transition.name(),
                slot.status
            )),
        }
    }
}
