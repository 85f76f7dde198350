use mcm_model::{EntityId, ErrorKind, Topic};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("corrupt data in collection '{collection}': {reason}")]
    CorruptData { collection: String, reason: String },

    #[error("collection '{collection}' never issued id {id}")]
    InvalidReference { collection: String, id: EntityId },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::CorruptData { .. } => ErrorKind::CorruptData,
            StoreError::InvalidReference { .. } => ErrorKind::InvalidReference,
            StoreError::Io(_) => ErrorKind::Io,
            StoreError::Serialize(_) | StoreError::LockPoisoned(_) => ErrorKind::Internal,
        }
    }
}

/// Failure reported by a bus subscriber.
///
/// Carries the error class back to the publisher so it can be mapped to a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        HandlerError::new(e.kind(), e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("no subscribers for topic {0}")]
    NoSubscribers(Topic),

    #[error("no subscriber replied to topic {0}")]
    NoReply(Topic),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BusError::UnknownTopic(_) | BusError::NoSubscribers(_) => ErrorKind::NotFound,
            BusError::NoReply(_) => ErrorKind::Internal,
            BusError::Handler(e) => e.kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UserError::MissingField(_) => ErrorKind::ExternalInput,
            UserError::Store(e) => e.kind(),
        }
    }
}
