use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use mcm_core::OutputSink;
use mcm_model::ServerId;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};
use tracing::{debug, trace};

/// Live-output sinks keyed by server id.
#[derive(Clone, Default)]
pub struct SinkTable {
    inner: Arc<Mutex<HashMap<ServerId, Arc<dyn OutputSink>>>>,
}

impl SinkTable {
    pub fn attach(&self, id: ServerId, sink: Arc<dyn OutputSink>) {
        self.lock().insert(id, sink);
    }

    pub fn detach(&self, id: ServerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn has_sink(&self, id: ServerId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Deliver `line` to the sink of `id`, dropping the sink if it reports itself closed.
    pub fn push(&self, id: ServerId, line: &str) {
        let Some(sink) = self.lock().get(&id).cloned() else {
            return;
        };
        if sink.push(id, line) {
            return;
        }

        let mut map = self.lock();
        if map.get(&id).is_some_and(|current| Arc::ptr_eq(current, &sink)) {
            map.remove(&id);
            debug!(target: "mcm.exec.proc", server_id = id, "output sink closed; detached");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ServerId, Arc<dyn OutputSink>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Forward every line of `stream` to the sink table until the stream closes.
///
/// Bytes that are not valid UTF-8 are replaced, so one bad line never ends the relay.
pub(crate) fn forward<R>(
    id: ServerId,
    stream: R,
    sinks: SinkTable,
    label: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(target: "mcm.exec.proc", server_id = id, stream = label, error = %e, "output relay failed");
                    break;
                }
            }
            let line = String::from_utf8_lossy(trim_newline(&buf));
            trace!(target: "mcm.exec.proc.out", server_id = id, stream = label, %line);
            sinks.push(id, &line);
        }
    })
}

fn trim_newline(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
