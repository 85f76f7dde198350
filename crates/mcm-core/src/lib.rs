pub mod error;
pub use error::{BusError, HandlerError, StoreError, UserError};

pub mod bus;
pub use bus::{Delivery, Event, EventBus, EventPayload, Outcome, Reply, Subscriber, WeakEventBus};

pub mod sink;
pub use sink::{ChannelSink, OutputSink};

pub mod store;
pub use store::EntityStore;

pub mod users;
pub use users::UserDirectory;
