//! Server process lifecycle.
//!
//! [`ProcessManager`] subscribes to the three process topics on the event bus, spawns the runtime
//! of a server inside its directory, keeps the [`ActiveRegistry`] of live processes and relays
//! their output to the attached [`OutputSink`]s. Status and pid are persisted through the entity
//! store.

mod registry;
mod relay;
pub use registry::{ActiveRegistry, ProcessHandle};
pub use relay::SinkTable;

#[cfg(all(test, unix))]
mod tests;

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use mcm_core::{
    EntityStore, Event, EventBus, EventPayload, HandlerError, OutputSink, Reply, Subscriber,
    WeakEventBus,
};
use mcm_model::{SERVERS, ServerId, ServerRecord, Topic};
use serde::{Deserialize, Serialize};
use tokio::process::Child;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{ExecError, ExecResult},
    fetch::RuntimeFetcher,
    props::PropertySchema,
    util::{LaunchConfig, find_artifact, launch_command},
};

/// Console command that asks a server to shut down.
pub const STOP_COMMAND: &str = "stop";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory under which one directory per server is created.
    pub base_path: PathBuf,
    pub launch: LaunchConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data/servers"),
            launch: LaunchConfig::default(),
        }
    }
}

pub struct ProcessManager {
    pub(crate) store: EntityStore,
    pub(crate) fetcher: Arc<dyn RuntimeFetcher>,
    pub(crate) schema: PropertySchema,
    pub(crate) cfg: ManagerConfig,
    bus: WeakEventBus,
    registry: ActiveRegistry,
    sinks: SinkTable,
}

impl ProcessManager {
    /// Build a manager and subscribe it to every process topic of `bus`.
    pub fn attach(
        store: EntityStore,
        bus: &EventBus,
        fetcher: Arc<dyn RuntimeFetcher>,
        cfg: ManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            store,
            fetcher,
            schema: PropertySchema::minecraft(),
            cfg,
            bus: bus.downgrade(),
            registry: ActiveRegistry::new(),
            sinks: SinkTable::default(),
        });

        for topic in Topic::ALL {
            bus.subscribe(topic, manager.clone());
        }
        manager
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.cfg
    }

    pub fn is_active(&self, id: ServerId) -> bool {
        self.registry.contains(id)
    }

    pub fn active_servers(&self) -> Vec<ServerId> {
        self.registry.active_ids()
    }

    /// Route output of server `id` to `sink`, replacing any previous sink.
    pub fn attach_sink(&self, id: ServerId, sink: Arc<dyn OutputSink>) {
        self.sinks.attach(id, sink);
    }

    pub fn detach_sink(&self, id: ServerId) -> bool {
        self.sinks.detach(id)
    }

    /// Spawn the runtime of the server named in the payload.
    ///
    /// A server that already has a live process is stopped first through the bus.
    #[instrument(level = "debug", target = "mcm.exec.proc", skip_all, fields(server_id = ?event.payload.server_id))]
    pub async fn start_server(&self, event: &Event) -> ExecResult<Reply> {
        let id = require_server_id(event)?;
        let server = self.server(id)?;
        let jar = self.locate_artifact(&server)?;

        if self.registry.contains(id) {
            debug!(target: "mcm.exec.proc", server_id = id, "already running; stopping first");
            if let Err(e) = self.dispatch(Topic::ServerStop, EventPayload::server(id)).await {
                warn!(target: "mcm.exec.proc", server_id = id, error = %e, "stop before restart failed");
            }
        }

        let mut child = launch_command(&self.cfg.launch, &server.path, &jar)
            .spawn()
            .map_err(|e| ExecError::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| ExecError::Spawn("process exited before reporting a pid".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecError::Spawn("stdin was not captured".into()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let displaced = self.registry.insert(id, ProcessHandle::new(pid, stdin));
        if let Some(sink) = &event.payload.sink {
            self.sinks.attach(id, sink.clone());
        }
        if let Some(stdout) = stdout {
            relay::forward(id, stdout, self.sinks.clone(), "stdout");
        }
        if let Some(stderr) = stderr {
            relay::forward(id, stderr, self.sinks.clone(), "stderr");
        }

        if let Some(displaced) = displaced {
            warn!(target: "mcm.exec.proc", server_id = id, pid = displaced.pid, "displaced a concurrent start");
            if let Err(e) = displaced.send_line(STOP_COMMAND).await {
                debug!(target: "mcm.exec.proc", server_id = id, error = %e, "displaced process did not take stop");
            }
        }
        self.watch_exit(id, pid, child);

        self.store.update_with(SERVERS, id, |s: &mut ServerRecord| {
            s.mark_running(pid);
            true
        })?;

        info!(target: "mcm.exec.proc", server_id = id, pid, jar = %jar, "server started");
        Ok(Reply::new(format!("server {id} started with process {pid}")).with_pid(pid))
    }

    /// Ask the server to stop, then forget its process and persist it as stopped.
    ///
    /// Registry and record are cleared even when the stop command could not be delivered, but
    /// only for the process that was live when the stop began. A process started meanwhile keeps
    /// its entry and its running record.
    #[instrument(level = "debug", target = "mcm.exec.proc", skip_all, fields(server_id = ?event.payload.server_id))]
    pub async fn stop_server(&self, event: &Event) -> ExecResult<Reply> {
        let id = require_server_id(event)?;
        self.server(id)?;
        let stopping = self.registry.pid_of(id);

        let outcome = self
            .dispatch(
                Topic::IssueCommand,
                EventPayload::server(id).with_command(STOP_COMMAND),
            )
            .await;

        let cleared = self.release(id, stopping)?;
        info!(target: "mcm.exec.proc", server_id = id, pid = ?stopping, cleared, delivered = outcome.is_ok(), "server stopped");
        outcome
    }

    /// Drop the registry entry of `pid` and persist the server as stopped.
    ///
    /// With `pid = None` no process was known, so only a record not claimed by a registered
    /// process is reset. Returns whether the record changed.
    pub(crate) fn release(&self, id: ServerId, pid: Option<u32>) -> ExecResult<bool> {
        if let Some(pid) = pid {
            self.registry.remove_if_pid(id, pid);
        }

        let registry = &self.registry;
        let mut changed = false;
        self.store.update_with(SERVERS, id, |s: &mut ServerRecord| {
            let owned = match pid {
                Some(pid) => s.pid.is_none_or(|current| current == pid),
                None => !registry.contains(id),
            };
            changed = owned && (s.status || s.pid.is_some());
            if changed {
                s.mark_stopped();
            }
            changed
        })?;
        Ok(changed)
    }

    /// Write one console line to the live process of the server.
    #[instrument(level = "debug", target = "mcm.exec.proc", skip_all, fields(server_id = ?event.payload.server_id))]
    pub async fn issue_command(&self, event: &Event) -> ExecResult<Reply> {
        let id = require_server_id(event)?;
        let command = event
            .payload
            .command
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ExecError::MissingInput("command"))?;
        if command.contains(['\n', '\r']) {
            return Err(ExecError::InvalidInput(
                "command must be a single line".to_string(),
            ));
        }

        let handle = self
            .registry
            .handle_of(id)
            .ok_or(ExecError::ProcessNotRunning(id))?;
        handle.send_line(command).await?;

        if command == STOP_COMMAND {
            self.registry.remove_if_pid(id, handle.pid);
        }

        debug!(target: "mcm.exec.proc", server_id = id, pid = handle.pid, command, "command issued");
        Ok(Reply::new(format!("command '{command}' issued to server {id}")).with_pid(handle.pid))
    }

    /// Mark every record that claims to be running, but has no live process here, as stopped.
    ///
    /// Returns how many records were reset.
    pub fn reconcile(&self) -> ExecResult<usize> {
        let record = self.store.get_all::<ServerRecord>(SERVERS)?;
        let mut reset = 0;

        for server in record.values() {
            let Some(id) = server.id else { continue };
            if (!server.status && server.pid.is_none()) || self.registry.contains(id) {
                continue;
            }
            let updated = self.store.update_with(SERVERS, id, |s: &mut ServerRecord| {
                s.mark_stopped();
                true
            })?;
            if updated.is_some() {
                warn!(target: "mcm.exec.proc", server_id = id, stale_pid = ?server.pid, "stale running record reset");
                reset += 1;
            }
        }
        Ok(reset)
    }

    pub(crate) fn server(&self, id: ServerId) -> ExecResult<ServerRecord> {
        self.store
            .get_one_by_id(SERVERS, id)?
            .ok_or(ExecError::ServerNotFound(id))
    }

    fn locate_artifact(&self, server: &ServerRecord) -> ExecResult<String> {
        let missing = || ExecError::ArtifactMissing {
            runtime: server.runtime.clone(),
            dir: server.path.clone(),
        };
        match find_artifact(&server.path, &server.runtime) {
            Ok(Some(jar)) => Ok(jar),
            Ok(None) => Err(missing()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(missing()),
            Err(e) => Err(e.into()),
        }
    }

    async fn dispatch(&self, topic: Topic, payload: EventPayload) -> ExecResult<Reply> {
        let bus = self
            .bus
            .upgrade()
            .ok_or_else(|| ExecError::Dispatch("event bus has been dropped".to_string()))?;
        Ok(bus.publish(Event::new(topic, payload)).await.into_result()?)
    }

    /// Clear registry entry and record once the process exits, unless a newer process took over.
    fn watch_exit(&self, id: ServerId, pid: u32, mut child: Child) {
        let registry = self.registry.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let status = child.wait().await;
            registry.remove_if_pid(id, pid);

            let persisted = store.update_with(SERVERS, id, |s: &mut ServerRecord| {
                if s.pid != Some(pid) {
                    return false;
                }
                s.mark_stopped();
                true
            });

            match (status, persisted) {
                (Ok(status), Ok(_)) => {
                    info!(target: "mcm.exec.proc", server_id = id, pid, code = ?status.code(), "process exited")
                }
                (Err(e), _) => {
                    warn!(target: "mcm.exec.proc", server_id = id, pid, error = %e, "waiting on process failed")
                }
                (_, Err(e)) => {
                    warn!(target: "mcm.exec.proc", server_id = id, pid, error = %e, "could not persist exit")
                }
            }
        });
    }
}

fn require_server_id(event: &Event) -> ExecResult<ServerId> {
    event
        .payload
        .server_id
        .ok_or(ExecError::MissingInput("serverId"))
}

#[async_trait]
impl Subscriber for ProcessManager {
    fn name(&self) -> &'static str {
        "process-manager"
    }

    async fn on_event(&self, event: &Event) -> Result<Option<Reply>, HandlerError> {
        let result = match event.topic {
            Topic::ServerStart => self.start_server(event).await,
            Topic::ServerStop => self.stop_server(event).await,
            Topic::IssueCommand => self.issue_command(event).await,
        };

        match result {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                debug!(target: "mcm.exec.proc", topic = %event.topic, error = %e, "request failed");
                Err(e.into())
            }
        }
    }
}
