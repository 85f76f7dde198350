//! Line-oriented operator console.

use std::{fmt::Write as _, sync::Arc};

use anyhow::Context;
use mcm_core::{EntityStore, EventBus, EventPayload, OutputSink, UserDirectory};
use mcm_exec::{CreateServer, ProcessManager, props::ServerConfig};
use mcm_model::{SERVERS, ServerId, ServerRecord, Topic, UserId};
use serde_json::Value;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  start <id>                               start a server
  stop <id>                                stop a server
  cmd <id> <text...>                       send a console line to a running server
  create <owner> <runtime> <name> [k=v...] provision a server (accepts the EULA)
  show <id>                                server record, EULA flag and properties
  list [owner]                             list servers, optionally for one owner
  config <id> k=v...                       rewrite server.properties
  adduser <username> <hash>                create a user
  help                                     this text
  quit                                     stop running servers and exit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a numeric id")]
    BadId(String),
    #[error("'{0}' is not a key=value pair")]
    BadPair(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Start(ServerId),
    Stop(ServerId),
    Command(ServerId, String),
    Create {
        owner: UserId,
        runtime: String,
        name: String,
        config: ServerConfig,
    },
    Show(ServerId),
    List(Option<UserId>),
    Config(ServerId, ServerConfig),
    AddUser {
        username: String,
        hash: String,
    },
    Help,
    Quit,
}

impl Directive {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Directive>, ParseError> {
        let line = line.trim();
        let Some((verb, rest)) = split_word(line) else {
            return Ok(None);
        };

        let directive = match verb {
            "start" => Directive::Start(single_id(rest, "start <id>")?),
            "stop" => Directive::Stop(single_id(rest, "stop <id>")?),
            "cmd" => {
                const USAGE: &str = "cmd <id> <text...>";
                let (id, text) = split_word(rest).ok_or(ParseError::Usage(USAGE))?;
                if text.is_empty() {
                    return Err(ParseError::Usage(USAGE));
                }
                Directive::Command(parse_id(id)?, text.to_string())
            }
            "create" => {
                const USAGE: &str = "create <owner> <runtime> <name> [k=v...]";
                let mut words = rest.split_whitespace();
                let (Some(owner), Some(runtime), Some(name)) =
                    (words.next(), words.next(), words.next())
                else {
                    return Err(ParseError::Usage(USAGE));
                };
                Directive::Create {
                    owner: parse_id(owner)?,
                    runtime: runtime.to_string(),
                    name: name.to_string(),
                    config: parse_pairs(words)?,
                }
            }
            "show" => Directive::Show(single_id(rest, "show <id>")?),
            "list" => match rest {
                "" => Directive::List(None),
                owner => Directive::List(Some(single_id(owner, "list [owner]")?)),
            },
            "config" => {
                const USAGE: &str = "config <id> k=v...";
                let mut words = rest.split_whitespace();
                let id = words.next().ok_or(ParseError::Usage(USAGE))?;
                let config = parse_pairs(words)?;
                if config.is_empty() {
                    return Err(ParseError::Usage(USAGE));
                }
                Directive::Config(parse_id(id)?, config)
            }
            "adduser" => {
                let mut words = rest.split_whitespace();
                match (words.next(), words.next(), words.next()) {
                    (Some(username), Some(hash), None) => Directive::AddUser {
                        username: username.to_string(),
                        hash: hash.to_string(),
                    },
                    _ => return Err(ParseError::Usage("adduser <username> <hash>")),
                }
            }
            "help" | "?" => Directive::Help,
            "quit" | "exit" => Directive::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(directive))
    }
}

fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((s, "")),
    }
}

fn parse_id(word: &str) -> Result<i64, ParseError> {
    word.parse().map_err(|_| ParseError::BadId(word.to_string()))
}

fn single_id(rest: &str, usage: &'static str) -> Result<i64, ParseError> {
    let mut words = rest.split_whitespace();
    match (words.next(), words.next()) {
        (Some(id), None) => parse_id(id),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn parse_pairs<'a>(words: impl Iterator<Item = &'a str>) -> Result<ServerConfig, ParseError> {
    words
        .map(|pair| {
            pair.split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .ok_or_else(|| ParseError::BadPair(pair.to_string()))
        })
        .collect()
}

/// Prints server output to stdout with a `[id]` prefix.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn push(&self, server_id: ServerId, chunk: &str) -> bool {
        println!("[{server_id}] {chunk}");
        true
    }
}

/// What the read loop should do after a directive ran.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(String),
    Quit,
}

pub struct Console {
    pub bus: EventBus,
    pub store: EntityStore,
    pub users: UserDirectory,
    pub manager: Arc<ProcessManager>,
    pub sink: Arc<dyn OutputSink>,
}

impl Console {
    /// Parse and run one input line; failures are rendered into the returned text.
    pub async fn handle_line(&self, line: &str) -> Flow {
        match Directive::parse(line) {
            Ok(None) => Flow::Continue(String::new()),
            Ok(Some(Directive::Quit)) => Flow::Quit,
            Ok(Some(directive)) => match self.execute(directive).await {
                Ok(out) => Flow::Continue(out),
                Err(e) => Flow::Continue(format!("error: {e:#}")),
            },
            Err(e) => Flow::Continue(format!("error: {e}")),
        }
    }

    pub async fn execute(&self, directive: Directive) -> anyhow::Result<String> {
        match directive {
            Directive::Start(id) => {
                let payload = EventPayload::server(id).with_sink(self.sink.clone());
                Ok(self.publish(Topic::ServerStart, payload).await?)
            }
            Directive::Stop(id) => Ok(self.publish(Topic::ServerStop, EventPayload::server(id)).await?),
            Directive::Command(id, text) => {
                let payload = EventPayload::server(id).with_command(text);
                Ok(self.publish(Topic::IssueCommand, payload).await?)
            }
            Directive::Create {
                owner,
                runtime,
                name,
                config,
            } => {
                let server = self
                    .manager
                    .create_server(CreateServer {
                        name,
                        runtime,
                        eula_accepted: true,
                        owner_user_id: Some(owner),
                        config,
                    })
                    .await?;
                Ok(format!(
                    "created server {} at {}",
                    server.id.unwrap_or_default(),
                    server.path.display()
                ))
            }
            Directive::Show(id) => {
                let details = self.manager.get_server_details(id)?;
                Ok(serde_json::to_string_pretty(&details)?)
            }
            Directive::List(owner) => {
                let servers = match owner {
                    Some(owner) => self.manager.servers_for_user(owner)?,
                    None => self
                        .store
                        .get_all::<ServerRecord>(SERVERS)?
                        .dict
                        .into_values()
                        .collect(),
                };
                Ok(render_list(&servers, &self.manager))
            }
            Directive::Config(id, config) => {
                let applied = self.manager.update_server_config(id, &config)?;
                let mut out = format!("server {id} configuration written");
                if !applied.ignored().is_empty() {
                    write!(out, " (ignored: {})", applied.ignored().join(", "))?;
                }
                Ok(out)
            }
            Directive::AddUser { username, hash } => {
                let user = self
                    .users
                    .create_user(&username, &hash)
                    .context("could not create user")?;
                Ok(format!("created user {} ({})", user.id.unwrap_or_default(), user.username))
            }
            Directive::Help => Ok(HELP.to_string()),
            Directive::Quit => Ok(String::new()),
        }
    }

    async fn publish(&self, topic: Topic, payload: EventPayload) -> anyhow::Result<String> {
        let reply = self.bus.dispatch(topic.as_str(), payload).await?;
        Ok(reply.message)
    }
}

fn render_list(servers: &[ServerRecord], manager: &ProcessManager) -> String {
    if servers.is_empty() {
        return "no servers".to_string();
    }
    let mut out = String::new();
    for s in servers {
        let id = s.id.unwrap_or_default();
        let state = if manager.is_active(id) {
            "running"
        } else if s.status {
            "stale"
        } else {
            "stopped"
        };
        let _ = writeln!(
            out,
            "{id:>4}  {state:<8} owner={} runtime={} name={}",
            s.owner_user_id, s.runtime, s.name
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcm_exec::{FetchError, ManagerConfig, RuntimeFetcher};
    use mcm_model::USERS;
    use serde_json::json;

    #[test]
    fn parses_every_directive() {
        assert_eq!(Directive::parse("  ").unwrap(), None);
        assert_eq!(Directive::parse("start 3").unwrap(), Some(Directive::Start(3)));
        assert_eq!(Directive::parse("stop 0").unwrap(), Some(Directive::Stop(0)));
        assert_eq!(
            Directive::parse("cmd 1 say hello world").unwrap(),
            Some(Directive::Command(1, "say hello world".to_string()))
        );
        assert_eq!(Directive::parse("list").unwrap(), Some(Directive::List(None)));
        assert_eq!(Directive::parse("list 2").unwrap(), Some(Directive::List(Some(2))));
        assert_eq!(Directive::parse("quit").unwrap(), Some(Directive::Quit));

        let Some(Directive::Create { owner, runtime, name, config }) =
            Directive::parse("create 0 1.14.1 survival motd=hi max-players=8").unwrap()
        else {
            panic!("expected create");
        };
        assert_eq!((owner, runtime.as_str(), name.as_str()), (0, "1.14.1", "survival"));
        assert_eq!(config.get("motd"), Some(&json!("hi")));
        assert_eq!(config.get("max-players"), Some(&json!("8")));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(Directive::parse("launch 1"), Err(ParseError::Unknown("launch".into())));
        assert_eq!(Directive::parse("start"), Err(ParseError::Usage("start <id>")));
        assert_eq!(Directive::parse("start one"), Err(ParseError::BadId("one".into())));
        assert_eq!(Directive::parse("cmd 1"), Err(ParseError::Usage("cmd <id> <text...>")));
        assert_eq!(Directive::parse("config 1"), Err(ParseError::Usage("config <id> k=v...")));
        assert_eq!(Directive::parse("config 1 motd"), Err(ParseError::BadPair("motd".into())));
    }

    struct NoFetch;

    #[async_trait]
    impl RuntimeFetcher for NoFetch {
        async fn fetch(&self, runtime: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::UnknownVersion(runtime.to_string()))
        }
    }

    fn console(dir: &tempfile::TempDir) -> Console {
        let store = EntityStore::open(dir.path().join("store")).unwrap();
        store.ensure_collection(SERVERS).unwrap();
        store.ensure_collection(USERS).unwrap();
        let bus = EventBus::new();
        let cfg = ManagerConfig {
            base_path: dir.path().join("servers"),
            ..ManagerConfig::default()
        };
        let manager = ProcessManager::attach(store.clone(), &bus, Arc::new(NoFetch), cfg);
        Console {
            bus,
            users: UserDirectory::new(store.clone()),
            store,
            manager,
            sink: Arc::new(StdoutSink),
        }
    }

    #[tokio::test]
    async fn console_round_trip_without_processes() {
        let dir = tempfile::TempDir::new().unwrap();
        let console = console(&dir);

        assert_eq!(
            console.handle_line("adduser johndoe 1234987a").await,
            Flow::Continue("created user 0 (johndoe)".to_string())
        );
        assert_eq!(console.handle_line("list").await, Flow::Continue("no servers".to_string()));

        let Flow::Continue(out) = console.handle_line("start 4").await else {
            panic!("start must not quit");
        };
        assert!(out.starts_with("error:"), "{out}");

        let Flow::Continue(out) = console.handle_line("create 0 1.14.1 srv").await else {
            panic!("create must not quit");
        };
        assert!(out.contains("unknown runtime version"), "{out}");

        assert_eq!(console.handle_line("quit").await, Flow::Quit);
    }
}
