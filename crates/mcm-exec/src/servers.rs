//! Server provisioning and configuration on top of [`ProcessManager`].

use std::path::Path;

use mcm_model::{EntityQuery, SERVERS, ServerDetails, ServerId, ServerRecord, UserId};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{ExecError, ExecResult},
    proc::ProcessManager,
    props::{self, ServerConfig, ServerProperties},
    util::artifact_name,
};

/// Input of [`ProcessManager::create_server`].
#[derive(Debug, Clone, Default)]
pub struct CreateServer {
    pub name: String,
    pub runtime: String,
    pub eula_accepted: bool,
    pub owner_user_id: Option<UserId>,
    pub config: ServerConfig,
}

impl CreateServer {
    fn validate(&self) -> ExecResult<UserId> {
        if self.name.trim().is_empty() {
            return Err(ExecError::MissingInput("name"));
        }
        if self.runtime.trim().is_empty() {
            return Err(ExecError::MissingInput("runtime"));
        }
        if self.runtime.contains(['/', '\\', ' ']) || self.runtime.contains("..") {
            return Err(ExecError::InvalidInput(format!(
                "runtime '{}' is not a version tag",
                self.runtime
            )));
        }
        if !self.eula_accepted {
            return Err(ExecError::EulaNotAccepted);
        }
        self.owner_user_id
            .ok_or(ExecError::MissingInput("ownerUserId"))
    }
}

impl ProcessManager {
    /// Provision a new server directory and persist a stopped record for it.
    ///
    /// Nothing is written when validation fails; the directory is removed again when a later
    /// step fails.
    #[instrument(level = "debug", target = "mcm.exec.proc", skip_all, fields(name = %req.name, runtime = %req.runtime))]
    pub async fn create_server(&self, req: CreateServer) -> ExecResult<ServerRecord> {
        let owner = req.validate()?;
        let properties = props::merge(&self.schema, &req.config)?;

        tokio::fs::create_dir_all(&self.cfg.base_path).await?;
        let dir = self.cfg.base_path.join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir(&dir).await?;

        let result = async {
            let dir = tokio::fs::canonicalize(&dir).await?;
            self.materialize(&dir, &req.runtime, &properties).await?;
            let record = ServerRecord::new(owner, req.name.trim(), req.runtime.as_str(), dir);
            Ok::<_, ExecError>(self.store.update_or_add(SERVERS, record)?)
        }
        .await;

        match result {
            Ok(server) => {
                info!(target: "mcm.exec.proc", server_id = ?server.id, path = %server.path.display(), "server created");
                Ok(server)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                    warn!(target: "mcm.exec.proc", path = %dir.display(), error = %cleanup, "could not remove partial server directory");
                }
                Err(e)
            }
        }
    }

    /// Record merged with the acceptance flag and properties found on disk.
    pub fn get_server_details(&self, id: ServerId) -> ExecResult<ServerDetails> {
        let server = self.server(id)?;
        let is_eula_accepted = props::read_eula_accepted(&server.path)?;
        let config = props::read_properties(&server.path)?;

        Ok(ServerDetails {
            id,
            owner_user_id: server.owner_user_id,
            name: server.name,
            runtime: server.runtime,
            path: server.path,
            status: server.status,
            pid: server.pid,
            is_eula_accepted,
            config,
        })
    }

    /// Rewrite `server.properties` from `config` merged over the defaults.
    pub fn update_server_config(
        &self,
        id: ServerId,
        config: &ServerConfig,
    ) -> ExecResult<ServerProperties> {
        let server = self.server(id)?;
        let properties = props::merge(&self.schema, config)?;
        props::write_properties(&server.path, &properties)?;

        info!(target: "mcm.exec.props", server_id = id, ignored = properties.ignored().len(), "server config updated");
        Ok(properties)
    }

    pub fn servers_for_user(&self, user_id: UserId) -> ExecResult<Vec<ServerRecord>> {
        let query = EntityQuery::new().with("ownerUserId", user_id.to_string());
        Ok(self.store.query_with(SERVERS, &query)?)
    }

    async fn materialize(
        &self,
        dir: &Path,
        runtime: &str,
        properties: &ServerProperties,
    ) -> ExecResult<()> {
        let artifact = self.fetcher.fetch(runtime).await?;
        tokio::fs::write(dir.join(artifact_name(runtime)), artifact).await?;

        props::write_eula(dir, true)?;
        props::write_properties(dir, properties)?;
        Ok(())
    }
}
