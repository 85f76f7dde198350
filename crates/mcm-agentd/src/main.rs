mod cli;
mod config;
mod console;

use std::sync::Arc;

use anyhow::Context;
use mcm_core::{EntityStore, EventBus, EventPayload, UserDirectory};
use mcm_exec::{MojangFetcher, ProcessManager};
use mcm_model::{SERVERS, Topic, USERS};
use mcm_observe::{Journal, logger_init};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::CliArgs,
    config::AgentConfig,
    console::{Console, Flow, StdoutSink},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let cfg = AgentConfig::load_or_create(&args.config_path)
        .await
        .with_context(|| format!("loading {}", args.config_path.display()))?;
    logger_init(&cfg.logger_config(args.log_level.as_deref())?)?;

    let store = EntityStore::open(&cfg.data.store_dir)
        .with_context(|| format!("opening store at {}", cfg.data.store_dir.display()))?;
    store.ensure_collection(SERVERS)?;
    store.ensure_collection(USERS)?;

    let bus = EventBus::new();
    for topic in Topic::ALL {
        bus.subscribe(topic, Arc::new(Journal::new()));
    }

    let fetcher = Arc::new(MojangFetcher::new(cfg.fetch.manifest_url.clone()));
    let manager = ProcessManager::attach(store.clone(), &bus, fetcher, cfg.manager_config());

    let reset = manager.reconcile()?;
    info!(
        target: "mcm.agentd",
        store = %cfg.data.store_dir.display(),
        servers = %cfg.data.servers_dir.display(),
        stale_reset = reset,
        "agent ready"
    );

    let console = Console {
        bus: bus.clone(),
        users: UserDirectory::new(store.clone()),
        store,
        manager: manager.clone(),
        sink: Arc::new(StdoutSink),
    };

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "mcm.agentd", "interrupt received");
        }
        on_signal.cancel();
    });

    run_console(&console, &token).await?;
    shutdown(&bus, &manager).await;
    Ok(())
}

async fn run_console(console: &Console, token: &CancellationToken) -> anyhow::Result<()> {
    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            line = lines.next_line() => line.context("reading console input")?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        match console.handle_line(&line).await {
            Flow::Quit => return Ok(()),
            Flow::Continue(out) if out.is_empty() => {}
            Flow::Continue(out) => println!("{out}"),
        }
    }
}

/// Ask every server with a live process to stop.
async fn shutdown(bus: &EventBus, manager: &ProcessManager) {
    for id in manager.active_servers() {
        match bus.dispatch(Topic::ServerStop.as_str(), EventPayload::server(id)).await {
            Ok(reply) => info!(target: "mcm.agentd", server_id = id, "{}", reply.message),
            Err(e) => warn!(target: "mcm.agentd", server_id = id, error = %e, "stop on shutdown failed"),
        }
    }
    info!(target: "mcm.agentd", "agent stopped");
}
