use std::{fs, path::Path};

use tracing::debug;

use super::{PropsError, generated_stamp};

pub const EULA_FILE: &str = "eula.txt";

const EULA_NOTICE: &str = "#By changing the setting below to TRUE you are indicating your agreement to our EULA (https://account.mojang.com/documents/minecraft_eula).";
const NOT_ACCEPTED: &str = "eula=false";

/// `eula.txt` text with the acceptance line set to `accepted`.
pub fn render_eula(accepted: bool, stamp: &str) -> String {
    let template = [EULA_NOTICE, "#", NOT_ACCEPTED];
    let lines: Vec<String> = template
        .iter()
        .map(|line| match *line {
            NOT_ACCEPTED => format!("eula={accepted}"),
            "#" => format!("#{stamp}"),
            other => other.to_string(),
        })
        .collect();

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn write_eula(dir: &Path, accepted: bool) -> Result<(), PropsError> {
    let path = dir.join(EULA_FILE);
    fs::write(&path, render_eula(accepted, &generated_stamp()))?;
    debug!(target: "mcm.exec.props", path = %path.display(), accepted, "eula written");
    Ok(())
}

/// `true` when `dir/eula.txt` has an `eula=true` line.
pub fn read_eula_accepted(dir: &Path) -> Result<bool, PropsError> {
    let contents = fs::read_to_string(dir.join(EULA_FILE))?;
    Ok(contents
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("eula=true")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_marker_and_stamps() {
        let text = render_eula(true, "Thu Oct 16 12:00:00 2026");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#By changing the setting below"));
        assert_eq!(lines[1], "#Thu Oct 16 12:00:00 2026");
        assert_eq!(lines[2], "eula=true");
    }

    #[test]
    fn acceptance_is_read_from_the_marker_line() {
        let dir = tempfile::TempDir::new().unwrap();
        write_eula(dir.path(), false).unwrap();
        assert!(!read_eula_accepted(dir.path()).unwrap());

        write_eula(dir.path(), true).unwrap();
        assert!(read_eula_accepted(dir.path()).unwrap());
    }
}
