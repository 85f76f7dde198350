//! Domain types shared by the store, the event bus and the process manager.
//!
//! Nothing in this crate performs I/O.

mod domain;
pub use domain::*;

mod kind;
pub use kind::{Topic, UnknownTopic};
