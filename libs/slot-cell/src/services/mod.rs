pub mod state_machine;
pub mod expander;
pub mod store;

pub use state_machine::*;
pub use expander::*;
pub use store::*;
