use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};

use mcm_model::ServerId;
use tokio::{io::AsyncWriteExt, process::ChildStdin, sync::Mutex as AsyncMutex};

/// Live process of one server.
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: SystemTime,
    stdin: Arc<AsyncMutex<ChildStdin>>,
}

impl ProcessHandle {
    pub fn new(pid: u32, stdin: ChildStdin) -> Self {
        Self {
            pid,
            started_at: SystemTime::now(),
            stdin: Arc::new(AsyncMutex::new(stdin)),
        }
    }

    /// Write `line` plus a newline to the process input.
    pub async fn send_line(&self, line: &str) -> std::io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }
}

/// In-memory map from server id to its live process. At most one entry per id.
#[derive(Clone, Default)]
pub struct ActiveRegistry {
    inner: Arc<Mutex<HashMap<ServerId, ProcessHandle>>>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ServerId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Register `handle`, returning the handle it displaced, if any.
    pub fn insert(&self, id: ServerId, handle: ProcessHandle) -> Option<ProcessHandle> {
        self.lock().insert(id, handle)
    }

    pub fn remove(&self, id: ServerId) -> Option<ProcessHandle> {
        self.lock().remove(&id)
    }

    /// Remove the entry only while it still belongs to `pid`.
    pub fn remove_if_pid(&self, id: ServerId, pid: u32) -> bool {
        let mut map = self.lock();
        match map.get(&id) {
            Some(handle) if handle.pid == pid => {
                map.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn pid_of(&self, id: ServerId) -> Option<u32> {
        self.lock().get(&id).map(|h| h.pid)
    }

    pub fn handle_of(&self, id: ServerId) -> Option<ProcessHandle> {
        self.lock().get(&id).cloned()
    }

    /// Ids with a live process, sorted.
    pub fn active_ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ServerId, ProcessHandle>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    async fn handle() -> (tokio::process::Child, ProcessHandle) {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let stdin = child.stdin.take().unwrap();
        (child, ProcessHandle::new(pid, stdin))
    }

    #[tokio::test]
    async fn insert_displaces_and_remove_if_pid_guards() {
        let registry = ActiveRegistry::new();
        let (mut a, first) = handle().await;
        let (mut b, second) = handle().await;
        let (first_pid, second_pid) = (first.pid, second.pid);

        assert!(registry.insert(1, first).is_none());
        let displaced = registry.insert(1, second).unwrap();
        assert_eq!(displaced.pid, first_pid);
        assert_eq!(registry.pid_of(1), Some(second_pid));

        assert!(!registry.remove_if_pid(1, first_pid));
        assert!(registry.contains(1));
        assert!(registry.remove_if_pid(1, second_pid));
        assert!(registry.active_ids().is_empty());

        a.kill().await.unwrap();
        b.kill().await.unwrap();
    }

    #[tokio::test]
    async fn send_line_reaches_process() {
        let (mut child, h) = handle().await;
        h.send_line("hello").await.unwrap();
        drop(h);
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }
}
