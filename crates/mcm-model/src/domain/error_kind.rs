use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure classes reported back to whoever issued a request.
///
/// None of them is retried by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A caller-supplied field is missing or malformed.
    ExternalInput,
    /// Unknown collection, id or topic.
    NotFound,
    /// The caller supplied an id that was never issued.
    InvalidReference,
    /// A command was addressed to a server without a live process.
    ProcessNotRunning,
    /// The runtime binary is absent from the server directory.
    ArtifactMissing,
    /// File or process I/O failed.
    Io,
    /// Persisted content could not be parsed.
    CorruptData,
    /// Anything else; indicates a defect rather than bad input.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExternalInput => "external input",
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidReference => "invalid reference",
            ErrorKind::ProcessNotRunning => "process not running",
            ErrorKind::ArtifactMissing => "artifact missing",
            ErrorKind::Io => "io",
            ErrorKind::CorruptData => "corrupt data",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
