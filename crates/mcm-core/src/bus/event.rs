use std::{
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use mcm_model::{ServerId, Topic};
use serde::{Deserialize, Serialize};

use crate::sink::OutputSink;

/// Message delivered to every subscriber of its topic.
#[derive(Clone, Debug)]
pub struct Event {
    pub topic: Topic,
    pub payload: EventPayload,
    pub timestamp: SystemTime,
}

impl Event {
    pub fn new(topic: Topic, payload: EventPayload) -> Self {
        Self {
            topic,
            payload,
            timestamp: SystemTime::now(),
        }
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> u128 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

/// Topic-specific data carried by an [`Event`].
///
/// `sink` is an in-process handle and never serialized.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip)]
    pub sink: Option<Arc<dyn OutputSink>>,
}

impl EventPayload {
    pub fn server(server_id: ServerId) -> Self {
        Self {
            server_id: Some(server_id),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPayload")
            .field("server_id", &self.server_id)
            .field("command", &self.command)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Successful answer from a subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Reply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pid: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_without_sink() {
        let (sink, _rx) = crate::sink::ChannelSink::new();
        let payload = EventPayload::server(2)
            .with_command("say hi")
            .with_sink(Arc::new(sink));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({ "serverId": 2, "command": "say hi" }));
    }

    #[test]
    fn timestamp_is_after_epoch() {
        let event = Event::new(Topic::ServerStart, EventPayload::server(0));
        assert!(event.timestamp_ms() > 0);
    }
}
