use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event category published on the bus.
///
/// The set is closed: a topic name that does not parse into one of these variants is rejected
/// when an event is created.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    /// Spawn the runtime of a server.
    ServerStart,
    /// Ask a running server to shut down.
    ServerStop,
    /// Write a console command to a running server.
    IssueCommand,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::ServerStart, Topic::ServerStop, Topic::IssueCommand];

    /// Wire name of the topic (`SERVER_START`, `SERVER_STOP`, `ISSUE_COMMAND`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ServerStart => "SERVER_START",
            Topic::ServerStop => "SERVER_STOP",
            Topic::IssueCommand => "ISSUE_COMMAND",
        }
    }

    /// Validates a topic name against the enumeration.
    pub fn lookup(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::lookup(s).ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
