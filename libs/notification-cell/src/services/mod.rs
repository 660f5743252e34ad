pub mod registry;
pub mod dispatcher;

pub use registry::{ChannelHandle, ConnectionRegistry};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
