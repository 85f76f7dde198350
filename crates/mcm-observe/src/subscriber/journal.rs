use async_trait::async_trait;
use mcm_core::{Event, HandlerError, Reply, Subscriber};

use crate::subscriber::view::log_event;

/// Bus subscriber that writes every published event to the log and never replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct Journal;

impl Journal {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscriber for Journal {
    fn name(&self) -> &'static str {
        "journal"
    }

    async fn on_event(&self, event: &Event) -> Result<Option<Reply>, HandlerError> {
        log_event(event);
        Ok(None)
    }
}
