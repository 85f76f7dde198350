use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, ServerId, UserId};

/// Persisted description of one managed game server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// Assigned by the store on first insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,
    pub owner_user_id: UserId,
    pub name: String,
    /// Runtime version tag, e.g. `"1.14.1"`.
    pub runtime: String,
    /// Absolute directory holding the runtime artifact and config files.
    pub path: PathBuf,
    /// `true` while the server is believed to be running.
    #[serde(default)]
    pub status: bool,
    /// Pid of the live process, `null` when stopped.
    #[serde(default)]
    pub pid: Option<u32>,
}

impl ServerRecord {
    /// A stopped server that has not been persisted yet.
    pub fn new(
        owner_user_id: UserId,
        name: impl Into<String>,
        runtime: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: None,
            owner_user_id,
            name: name.into(),
            runtime: runtime.into(),
            path: path.into(),
            status: false,
            pid: None,
        }
    }

    pub fn with_id(mut self, id: ServerId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.status = true;
        self.pid = Some(pid);
    }

    pub fn mark_stopped(&mut self) {
        self.status = false;
        self.pid = None;
    }
}

impl Entity for ServerRecord {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

/// Merged view of a server record and its on-disk configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    pub id: ServerId,
    pub owner_user_id: UserId,
    pub name: String,
    pub runtime: String,
    pub path: PathBuf,
    pub status: bool,
    pub pid: Option<u32>,
    /// Whether the acceptance artifact records acceptance of the runtime's terms.
    pub is_eula_accepted: bool,
    /// Flat `key -> value` view of the properties artifact.
    pub config: BTreeMap<String, String>,
}
