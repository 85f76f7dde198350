use std::{path::Path, process::Stdio};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// How a server runtime is launched: `<program> <jvm_args…> -jar <artifact> <trailing_args…>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub program: String,
    pub jvm_args: Vec<String>,
    pub trailing_args: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            jvm_args: vec!["-Xmx1G".to_string(), "-Xms1G".to_string()],
            trailing_args: vec!["nogui".to_string()],
        }
    }
}

/// Build the command for the artifact `jar` inside `dir`, with all three standard streams piped.
pub fn launch_command(cfg: &LaunchConfig, dir: &Path, jar: &str) -> Command {
    let mut cmd = Command::new(&cfg.program);
    cmd.args(&cfg.jvm_args)
        .arg("-jar")
        .arg(dir.join(jar))
        .args(&cfg.trailing_args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Artifact for `runtime` inside `dir`.
///
/// The name written by the fetcher wins. Otherwise any file ending in `<runtime>.jar` is taken,
/// as long as the runtime tag is not the tail of a longer version (`4.1` never matches `1.14.1`).
pub fn find_artifact(dir: &Path, runtime: &str) -> std::io::Result<Option<String>> {
    let exact = artifact_name(runtime);
    if dir.join(&exact).is_file() {
        return Ok(Some(exact));
    }

    let suffix = format!("{runtime}.jar");
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(head) = name.strip_suffix(&suffix) else {
            continue;
        };
        if !head.ends_with(|c: char| c.is_ascii_digit() || c == '.') {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

/// Name the fetched artifact for `runtime` is stored under.
#[inline]
pub fn artifact_name(runtime: &str) -> String {
    format!("minecraft-server-{runtime}.jar")
}
