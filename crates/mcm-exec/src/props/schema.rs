use std::fmt;

/// Value type a property key accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Bool,
    Int,
    Text,
}

impl PropKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropKind::Bool => "bool",
            PropKind::Int => "integer",
            PropKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl PropValue {
    pub fn kind(&self) -> PropKind {
        match self {
            PropValue::Bool(_) => PropKind::Bool,
            PropValue::Int(_) => PropKind::Int,
            PropValue::Text(_) => PropKind::Text,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Int(i) => write!(f, "{i}"),
            PropValue::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered set of known property keys with their default values.
///
/// The default value also fixes the key's [`PropKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    defaults: Vec<(String, PropValue)>,
}

impl PropertySchema {
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, PropValue)>,
        K: Into<String>,
    {
        Self {
            defaults: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn defaults(&self) -> &[(String, PropValue)] {
        &self.defaults
    }

    pub fn kind_of(&self, key: &str) -> Option<PropKind> {
        self.defaults
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.kind())
    }

    /// Stock `server.properties` of a vanilla dedicated server.
    pub fn minecraft() -> Self {
        use PropValue::{Bool, Int, Text};
        let text = |s: &str| Text(s.to_string());

        Self::from_entries([
            ("spawn-protection", Int(16)),
            ("max-tick-time", Int(60000)),
            ("query.port", Int(25565)),
            ("generator-settings", text("")),
            ("force-gamemode", Bool(false)),
            ("allow-nether", Bool(true)),
            ("enforce-whitelist", Bool(false)),
            ("gamemode", text("survival")),
            ("broadcast-console-to-ops", Bool(true)),
            ("enable-query", Bool(false)),
            ("player-idle-timeout", Int(0)),
            ("difficulty", text("easy")),
            ("spawn-monsters", Bool(true)),
            ("broadcast-rcon-to-ops", Bool(true)),
            ("op-permission-level", Int(4)),
            ("pvp", Bool(true)),
            ("snooper-enabled", Bool(true)),
            ("level-type", text("default")),
            ("hardcore", Bool(false)),
            ("enable-command-block", Bool(false)),
            ("max-players", Int(20)),
            ("network-compression-threshold", Int(256)),
            ("resource-pack-sha1", text("")),
            ("max-world-size", Int(29999984)),
            ("function-permission-level", Int(2)),
            ("rcon.port", Int(25575)),
            ("server-port", Int(25565)),
            ("server-ip", text("")),
            ("spawn-npcs", Bool(true)),
            ("allow-flight", Bool(false)),
            ("level-name", text("world")),
            ("view-distance", Int(10)),
            ("resource-pack", text("")),
            ("spawn-animals", Bool(true)),
            ("white-list", Bool(false)),
            ("rcon.password", text("")),
            ("generate-structures", Bool(true)),
            ("online-mode", Bool(true)),
            ("max-build-height", Int(256)),
            ("level-seed", text("")),
            ("prevent-proxy-connections", Bool(false)),
            ("use-native-transport", Bool(true)),
            ("motd", text("A Minecraft Server")),
            ("enable-rcon", Bool(false)),
        ])
    }
}

impl Default for PropertySchema {
    fn default() -> Self {
        Self::minecraft()
    }
}
