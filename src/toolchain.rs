use std::{fs, path::Path, process::Command};

use anyhow::{Context, Result};

/// Read the `edition` key from the project's `Cargo.toml`, if present.
pub fn edition_from_cargo_toml(project_root: &Path) -> Result<Option<String>> {
    let manifest = project_root.join("Cargo.toml");
    let text = match fs::read_to_string(&manifest) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {manifest:?}")),
    };

    for entry in text.lines() {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        // A commented-out assignment leaves the `#` stuck to the key side.
        if key.trim() != "edition" {
            continue;
        }

        let value = value.split('#').next().unwrap_or("").trim();
        let edition = value.trim_matches(|c| c == '"' || c == '\'');
        if !edition.is_empty() {
            return Ok(Some(edition.to_string()));
        }
    }

    Ok(None)
}

/// One-line version string of the build tool.
pub fn cargo_version(cargo_cmd: &str) -> Result<String> {
    let out = Command::new(cargo_cmd)
        .arg("--version")
        .output()
        .with_context(|| format!("failed to execute `{cargo_cmd} --version`"))?;

    let text = if out.stdout.is_empty() {
        String::from_utf8_lossy(&out.stderr).to_string()
    } else {
        String::from_utf8_lossy(&out.stdout).to_string()
    };

    let one_line = text.trim().replace('\n', " ");
    if !out.status.success() {
        anyhow::bail!("`{cargo_cmd} --version` failed: {one_line}");
    }

    Ok(one_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with_manifest(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.toml"), contents).unwrap();
        dir
    }

    #[test]
    fn edition_is_parsed_with_comments_and_quotes() {
        let dir = root_with_manifest("[package]\nedition = \"2021\" # stable\n");
        assert_eq!(
            edition_from_cargo_toml(dir.path()).unwrap().as_deref(),
            Some("2021")
        );
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(edition_from_cargo_toml(dir.path()).unwrap(), None);
    }

    #[test]
    fn manifest_without_edition_is_none() {
        let dir = root_with_manifest("[package]\nname = \"demo\"\n");
        assert_eq!(edition_from_cargo_toml(dir.path()).unwrap(), None);
    }

    #[test]
    fn commented_out_assignments_are_ignored() {
        let dir = root_with_manifest("[package]\n# edition = \"2015\"\nedition = '2021'\n");
        assert_eq!(
            edition_from_cargo_toml(dir.path()).unwrap().as_deref(),
            Some("2021")
        );
    }
}
