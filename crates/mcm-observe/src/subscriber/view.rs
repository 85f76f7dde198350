use std::borrow::Borrow;

use mcm_core::Event;
use mcm_model::Topic;
use tracing::{debug, info};

/// Read-only accessors used when logging a bus event.
pub trait View {
    fn topic(&self) -> Topic;
    fn server_id(&self) -> i64;
    fn command(&self) -> &str;
    fn timestamp_ms(&self) -> u128;
    fn has_sink(&self) -> bool;
}

impl<T> View for T
where
    T: Borrow<Event>,
{
    #[inline]
    fn topic(&self) -> Topic {
        self.borrow().topic
    }
    #[inline]
    fn server_id(&self) -> i64 {
        self.borrow().payload.server_id.unwrap_or(-1)
    }
    #[inline]
    fn command(&self) -> &str {
        self.borrow().payload.command.as_deref().unwrap_or("")
    }
    #[inline]
    fn timestamp_ms(&self) -> u128 {
        self.borrow().timestamp_ms()
    }
    #[inline]
    fn has_sink(&self) -> bool {
        self.borrow().payload.sink.is_some()
    }
}

#[inline]
pub fn message_for(topic: Topic) -> &'static str {
    match topic {
        Topic::ServerStart => "server start requested",
        Topic::ServerStop => "server stop requested",
        Topic::IssueCommand => "console command requested",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.topic());

    match e.topic() {
        Topic::ServerStart => info!(
            target: "mcm.bus",
            server_id = e.server_id(),
            with_sink = e.has_sink(),
            ts = e.timestamp_ms() as u64,
            "{msg}"
        ),
        Topic::ServerStop => info!(
            target: "mcm.bus",
            server_id = e.server_id(),
            ts = e.timestamp_ms() as u64,
            "{msg}"
        ),
        Topic::IssueCommand => debug!(
            target: "mcm.bus",
            server_id = e.server_id(),
            command = e.command(),
            ts = e.timestamp_ms() as u64,
            "{msg}"
        ),
    }
}
