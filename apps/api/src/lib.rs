pub mod app;
pub mod router;

pub use app::{AppServices, BackgroundTasks, Stores};
pub use router::create_router;
