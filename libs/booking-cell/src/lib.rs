pub mod models;
pub mod error;
pub mod store;
pub mod services;
pub mod handlers;
pub mod router;

pub use models::*;
pub use error::*;
pub use store::*;
pub use services::*;
pub use router::{booking_routes, slot_routes, BookingState};
