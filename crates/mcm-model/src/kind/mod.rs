mod topic;
pub use topic::{Topic, UnknownTopic};
