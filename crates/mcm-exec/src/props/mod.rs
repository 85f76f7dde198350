//! Materialization of the two files a server runtime reads at boot: `eula.txt` and
//! `server.properties`.
//!
//! Caller configuration is merged over a [`PropertySchema`]. Values are coerced to the key's kind
//! and rejected when they cannot be. Keys outside the schema are dropped and reported through
//! [`ServerProperties::ignored`].

mod eula;
mod schema;

pub use eula::{EULA_FILE, read_eula_accepted, render_eula, write_eula};
pub use schema::{PropKind, PropValue, PropertySchema};

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use mcm_model::ErrorKind;
use serde_json::Value;
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};
use tracing::debug;

pub const PROPERTIES_FILE: &str = "server.properties";

const PROPERTIES_TITLE: &str = "#Minecraft server properties";

/// Partial configuration as supplied by a caller.
pub type ServerConfig = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum PropsError {
    #[error("invalid value for '{key}': expected {expected}, got {got}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        got: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PropsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PropsError::InvalidValue { .. } => ErrorKind::ExternalInput,
            PropsError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result of merging caller configuration over the schema defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    entries: Vec<(String, PropValue)>,
    ignored: Vec<String>,
}

impl ServerProperties {
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, PropValue)] {
        &self.entries
    }

    /// Caller keys that are not part of the schema.
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    /// `server.properties` text: title line, `stamp` comment, then `key=value` lines in schema
    /// order.
    pub fn render(&self, stamp: &str) -> String {
        let mut out = String::with_capacity(self.entries.len() * 24);
        out.push_str(PROPERTIES_TITLE);
        out.push('\n');
        out.push('#');
        out.push_str(stamp);
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }
}

/// Merge `input` over the defaults of `schema`.
pub fn merge(schema: &PropertySchema, input: &ServerConfig) -> Result<ServerProperties, PropsError> {
    let mut entries = schema.defaults().to_vec();
    let mut ignored = Vec::new();

    for (key, raw) in input {
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = coerce(key, slot.kind(), raw)?,
            None => ignored.push(key.clone()),
        }
    }

    if !ignored.is_empty() {
        debug!(target: "mcm.exec.props", ?ignored, "unknown property keys dropped");
    }
    Ok(ServerProperties { entries, ignored })
}

fn coerce(key: &str, kind: PropKind, raw: &Value) -> Result<PropValue, PropsError> {
    let value = match (kind, raw) {
        (PropKind::Bool, Value::Bool(b)) => Some(PropValue::Bool(*b)),
        (PropKind::Bool, Value::String(s)) => s.trim().parse().ok().map(PropValue::Bool),
        (PropKind::Int, Value::Number(n)) => n.as_i64().map(PropValue::Int),
        (PropKind::Int, Value::String(s)) => s.trim().parse().ok().map(PropValue::Int),
        (PropKind::Text, Value::String(s)) => Some(PropValue::Text(s.clone())),
        (PropKind::Text, Value::Number(n)) => Some(PropValue::Text(n.to_string())),
        (PropKind::Text, Value::Bool(b)) => Some(PropValue::Text(b.to_string())),
        _ => None,
    };

    match value {
        Some(PropValue::Text(s)) if s.contains(['\n', '\r']) => Err(invalid(key, kind, raw)),
        Some(v) => Ok(v),
        None => Err(invalid(key, kind, raw)),
    }
}

fn invalid(key: &str, kind: PropKind, raw: &Value) -> PropsError {
    PropsError::InvalidValue {
        key: key.to_string(),
        expected: kind.as_str(),
        got: raw.to_string(),
    }
}

/// Render `props` into `dir/server.properties`.
pub fn write_properties(dir: &Path, props: &ServerProperties) -> Result<PathBuf, PropsError> {
    let path = dir.join(PROPERTIES_FILE);
    fs::write(&path, props.render(&generated_stamp()))?;
    debug!(target: "mcm.exec.props", path = %path.display(), "properties written");
    Ok(path)
}

/// Flat view of `dir/server.properties`.
pub fn read_properties(dir: &Path) -> Result<BTreeMap<String, String>, PropsError> {
    let contents = fs::read_to_string(dir.join(PROPERTIES_FILE))?;
    Ok(parse_properties(&contents))
}

/// Parse `key=value` lines, skipping comments and lines without `=`.
pub fn parse_properties(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Generation time written into the comment line of each artifact.
pub(crate) fn generated_stamp() -> String {
    let format = format_description!(
        "[weekday repr:short] [month repr:short] [day] [hour]:[minute]:[second] [year]"
    );
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(format)
        .unwrap_or_default()
}
