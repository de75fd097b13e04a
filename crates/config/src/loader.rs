use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    Error, Result,
    env_subst::substitute_env,
    error::Context,
    schema::BridgeConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "hostex-bridge.toml",
    "hostex-bridge.yaml",
    "hostex-bridge.yml",
    "hostex-bridge.json",
];

const APP_NAME: &str = "hostex-bridge";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./hostex-bridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/hostex-bridge/hostex-bridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BridgeConfig::default()` if no config file is found or it fails to parse.
pub fn discover_and_load() -> BridgeConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    BridgeConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/hostex-bridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default user-global TOML path.
pub fn find_or_default_config_path() -> Result<PathBuf> {
    if let Some(path) = find_config_file() {
        return Ok(path);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILENAMES[0]))
        .context("could not determine the user config directory")
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::io::Write};

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "hostex-bridge.toml",
            "[bridge]\nshutdown_grace_secs = 3\n\n[logins.main]\naccess_token = \"abc\"\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.bridge.shutdown_grace_secs, 3);
        assert_eq!(cfg.logins["main"]["access_token"], "abc");
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write_file(
            dir.path(),
            "hostex-bridge.yaml",
            "logging:\n  json: true\nlogins:\n  a:\n    access_token: x\n",
        );
        let cfg = load_config(&yaml).unwrap();
        assert!(cfg.logging.json);
        assert!(cfg.logins.contains_key("a"));

        let json = write_file(
            dir.path(),
            "hostex-bridge.json",
            r#"{"logins": {"b": {"access_token": "y"}}}"#,
        );
        let cfg = load_config(&json).unwrap();
        assert_eq!(cfg.logins["b"]["access_token"], "y");
    }

    #[test]
    fn unsupported_extension_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "hostex-bridge.ini", "x=1");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { ref extension } if extension == "ini"));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn find_in_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "hostex-bridge.json", "{}");
        write_file(dir.path(), "hostex-bridge.toml", "");
        let found = find_in(dir.path()).unwrap();
        assert!(found.ends_with("hostex-bridge.toml"));
    }
}
