use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use mcm_core::{BusError, ChannelSink, EntityStore, EventBus, EventPayload};
use mcm_model::{ErrorKind, SERVERS, ServerRecord, USERS};
use serde_json::json;
use tempfile::TempDir;
use tokio::{sync::mpsc::UnboundedReceiver, time::timeout};

use super::*;
use crate::{
    CreateServer,
    fetch::{FetchError, RuntimeFetcher},
    util::LaunchConfig,
};

/// Echoes every input line and exits after `stop`, like a well-behaved server console.
const CONSOLE: &str = r#"echo ready; while read line; do echo "got $line"; [ "$line" = stop ] && exit 0; done"#;

struct FakeFetcher;

#[async_trait]
impl RuntimeFetcher for FakeFetcher {
    async fn fetch(&self, runtime: &str) -> Result<Vec<u8>, FetchError> {
        match runtime {
            "9.9.9" => Err(FetchError::UnknownVersion(runtime.to_string())),
            _ => Ok(b"not really a jar".to_vec()),
        }
    }
}

struct Fixture {
    _data: TempDir,
    bus: EventBus,
    store: EntityStore,
    manager: Arc<ProcessManager>,
    base: PathBuf,
}

fn fixture() -> Fixture {
    let data = TempDir::new().unwrap();
    let store = EntityStore::open(data.path().join("store")).unwrap();
    store.ensure_collection(SERVERS).unwrap();
    store.ensure_collection(USERS).unwrap();

    let base = data.path().join("servers");
    let cfg = ManagerConfig {
        base_path: base.clone(),
        launch: LaunchConfig {
            program: "sh".to_string(),
            jvm_args: vec!["-c".to_string(), CONSOLE.to_string(), "sh".to_string()],
            trailing_args: Vec::new(),
        },
    };

    let bus = EventBus::new();
    let manager = ProcessManager::attach(store.clone(), &bus, Arc::new(FakeFetcher), cfg);
    Fixture {
        _data: data,
        bus,
        store,
        manager,
        base,
    }
}

fn request(config: serde_json::Value) -> CreateServer {
    CreateServer {
        name: "survival".to_string(),
        runtime: "1.14.1".to_string(),
        eula_accepted: true,
        owner_user_id: Some(0),
        config: serde_json::from_value(config).unwrap(),
    }
}

async fn next_line(rx: &mut UnboundedReceiver<(ServerId, String)>) -> String {
    let (_, line) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("output timed out")
        .expect("sink closed");
    line
}

fn stored(fx: &Fixture, id: ServerId) -> ServerRecord {
    fx.store.get_one_by_id(SERVERS, id).unwrap().unwrap()
}

fn base_entries(fx: &Fixture) -> usize {
    std::fs::read_dir(&fx.base).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn create_rejects_missing_inputs_without_side_effects() {
    let fx = fixture();

    let cases = [
        CreateServer { name: String::new(), ..request(json!({})) },
        CreateServer { runtime: String::new(), ..request(json!({})) },
        CreateServer { eula_accepted: false, ..request(json!({})) },
        CreateServer { owner_user_id: None, ..request(json!({})) },
        request(json!({ "max-players": "many" })),
    ];

    for req in cases {
        let err = fx.manager.create_server(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalInput, "{err}");
    }

    assert_eq!(base_entries(&fx), 0);
    assert!(fx.store.get_all::<ServerRecord>(SERVERS).unwrap().is_empty());
}

#[tokio::test]
async fn create_then_details_round_trip() {
    let fx = fixture();
    let server = fx
        .manager
        .create_server(request(json!({ "motd": "hello", "unknownKey": "x" })))
        .await
        .unwrap();

    assert_eq!(server.id, Some(0));
    assert!(!server.status);
    assert!(server.path.join("minecraft-server-1.14.1.jar").is_file());

    let details = fx.manager.get_server_details(0).unwrap();
    assert!(details.is_eula_accepted);
    assert_eq!(details.config.get("motd").map(String::as_str), Some("hello"));
    assert_eq!(details.config.get("max-players").map(String::as_str), Some("20"));
    assert!(!details.config.contains_key("unknownKey"));
}

#[tokio::test]
async fn failed_fetch_removes_directory() {
    let fx = fixture();
    let err = fx
        .manager
        .create_server(CreateServer { runtime: "9.9.9".into(), ..request(json!({})) })
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Fetch(FetchError::UnknownVersion(_))));
    assert_eq!(base_entries(&fx), 0);
    assert!(fx.store.get_all::<ServerRecord>(SERVERS).unwrap().is_empty());
}

#[tokio::test]
async fn update_config_rewrites_properties() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();

    let mut config = BTreeMap::new();
    config.insert("difficulty".to_string(), json!("hard"));
    config.insert("bogus".to_string(), json!(1));
    let applied = fx.manager.update_server_config(0, &config).unwrap();
    assert_eq!(applied.ignored(), ["bogus".to_string()]);

    let details = fx.manager.get_server_details(0).unwrap();
    assert_eq!(details.config.get("difficulty").map(String::as_str), Some("hard"));

    let err = fx.manager.update_server_config(7, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn servers_are_listed_per_owner() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();
    fx.manager
        .create_server(CreateServer { owner_user_id: Some(1), ..request(json!({})) })
        .await
        .unwrap();

    let mine = fx.manager.servers_for_user(1).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].owner_user_id, 1);
}

#[tokio::test]
async fn start_command_stop_through_bus() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();

    let (sink, mut rx) = ChannelSink::new();
    let started = fx
        .bus
        .dispatch("SERVER_START", EventPayload::server(0).with_sink(Arc::new(sink)))
        .await
        .unwrap();
    let pid = started.pid.unwrap();

    assert!(fx.manager.is_active(0));
    let record = stored(&fx, 0);
    assert!(record.status);
    assert_eq!(record.pid, Some(pid));
    assert_eq!(next_line(&mut rx).await, "ready");

    fx.bus
        .dispatch("ISSUE_COMMAND", EventPayload::server(0).with_command("say hi"))
        .await
        .unwrap();
    assert_eq!(next_line(&mut rx).await, "got say hi");

    fx.bus
        .dispatch("SERVER_STOP", EventPayload::server(0))
        .await
        .unwrap();
    assert_eq!(next_line(&mut rx).await, "got stop");
    assert!(!fx.manager.is_active(0));

    let record = stored(&fx, 0);
    assert!(!record.status);
    assert_eq!(record.pid, None);
}

#[tokio::test]
async fn restart_keeps_a_single_process() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();

    let first = fx.bus.dispatch("SERVER_START", EventPayload::server(0)).await.unwrap();
    let second = fx.bus.dispatch("SERVER_START", EventPayload::server(0)).await.unwrap();

    assert_ne!(first.pid, second.pid);
    assert_eq!(fx.manager.active_servers(), vec![0]);
    assert_eq!(stored(&fx, 0).pid, second.pid);

    fx.bus.dispatch("SERVER_STOP", EventPayload::server(0)).await.unwrap();
}

#[tokio::test]
async fn late_stop_leaves_newer_process_running() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();

    let old = fx.bus.dispatch("SERVER_START", EventPayload::server(0)).await.unwrap();
    let new = fx.bus.dispatch("SERVER_START", EventPayload::server(0)).await.unwrap();
    let (old_pid, new_pid) = (old.pid.unwrap(), new.pid.unwrap());

    // a stop that began against the old process finishes after the restart
    assert!(!fx.manager.release(0, Some(old_pid)).unwrap());
    assert!(!fx.manager.release(0, None).unwrap());

    assert_eq!(fx.manager.registry.pid_of(0), Some(new_pid));
    let record = stored(&fx, 0);
    assert!(record.status);
    assert_eq!(record.pid, Some(new_pid));

    fx.bus
        .dispatch("ISSUE_COMMAND", EventPayload::server(0).with_command("stop"))
        .await
        .unwrap();
    assert!(fx.manager.release(0, Some(new_pid)).unwrap());
    assert!(!fx.manager.is_active(0));
    assert_eq!(stored(&fx, 0).pid, None);
}

#[tokio::test]
async fn stop_command_unregisters_before_exit() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();
    fx.bus.dispatch("SERVER_START", EventPayload::server(0)).await.unwrap();

    fx.bus
        .dispatch("ISSUE_COMMAND", EventPayload::server(0).with_command("stop"))
        .await
        .unwrap();
    assert!(!fx.manager.is_active(0));

    // the exit watcher settles the record once the process is gone
    let settled = timeout(Duration::from_secs(5), async {
        loop {
            if !stored(&fx, 0).status {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(settled.is_ok());
    assert_eq!(stored(&fx, 0).pid, None);
}

#[tokio::test]
async fn start_failures_are_classified() {
    let fx = fixture();

    let err = fx.bus.dispatch("SERVER_START", EventPayload::server(5)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let server = fx.manager.create_server(request(json!({}))).await.unwrap();
    std::fs::remove_file(server.path.join("minecraft-server-1.14.1.jar")).unwrap();
    let (sink, _rx) = ChannelSink::new();
    let err = fx
        .bus
        .dispatch("SERVER_START", EventPayload::server(0).with_sink(Arc::new(sink)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactMissing);
    assert!(!fx.manager.is_active(0));
    assert!(!fx.manager.detach_sink(0), "sink stayed attached to a server that never started");

    let err = fx.bus.dispatch("SERVER_START", EventPayload::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalInput);
}

#[tokio::test]
async fn commands_need_a_live_process_and_one_line() {
    let fx = fixture();
    fx.manager.create_server(request(json!({}))).await.unwrap();

    let err = fx
        .bus
        .dispatch("ISSUE_COMMAND", EventPayload::server(0).with_command("list"))
        .await
        .unwrap_err();
    assert!(matches!(&err, BusError::Handler(h) if h.kind == ErrorKind::ProcessNotRunning));

    let err = fx
        .bus
        .dispatch("ISSUE_COMMAND", EventPayload::server(0).with_command("say a\nop me"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalInput);

    // stopping a stopped server still reports the undelivered command but leaves it stopped
    let err = fx.bus.dispatch("SERVER_STOP", EventPayload::server(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessNotRunning);
    assert!(!stored(&fx, 0).status);
}

#[tokio::test]
async fn reconcile_resets_stale_records() {
    let fx = fixture();
    let mut stale = ServerRecord::new(0, "ghost", "1.13", fx.base.join("ghost"));
    stale.mark_running(999_999);
    fx.store.update_or_add(SERVERS, stale).unwrap();
    fx.store
        .update_or_add(SERVERS, ServerRecord::new(0, "idle", "1.13", fx.base.join("idle")))
        .unwrap();

    assert_eq!(fx.manager.reconcile().unwrap(), 1);
    let record = stored(&fx, 0);
    assert!(!record.status);
    assert_eq!(record.pid, None);
    assert_eq!(fx.manager.reconcile().unwrap(), 0);
}
