use mcm_model::ServerId;
use tokio::sync::mpsc;

/// Receiver of a running server's console output.
///
/// Chunks are single lines without the trailing newline.
pub trait OutputSink: Send + Sync + 'static {
    /// Deliver one chunk. Returning `false` marks the sink as closed; it will not be called again.
    fn push(&self, server_id: ServerId, chunk: &str) -> bool;
}

/// Sink backed by an unbounded channel. Closed once the receiver is dropped.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(ServerId, String)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ServerId, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutputSink for ChannelSink {
    fn push(&self, server_id: ServerId, chunk: &str) -> bool {
        self.tx.send((server_id, chunk.to_string())).is_ok()
    }
}
