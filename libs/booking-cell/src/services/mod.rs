pub mod clock;
pub mod events;
pub mod coordinator;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::EventPublisher;
pub use coordinator::{BookingCoordinator, BookingPolicy, ConfirmBooking};
pub use sweeper::HoldExpirySweeper;
