//! Configuration file resolution and loading
//!
//! Resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`~/.config/sonolink/config.toml` on Linux)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no CLI path is given
pub const CONFIG_ENV_VAR: &str = "SONOLINK_CONFIG";

/// Resolve the configuration file path, if any exists.
///
/// Returns `None` when no file is found anywhere in the priority chain;
/// callers then fall back to compiled defaults.
pub fn resolve_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Platform config directory
    let user_config = dirs::config_dir().map(|d| d.join("sonolink").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    // Linux system-wide fallback
    let system_config = PathBuf::from("/etc/sonolink/config.toml");
    if cfg!(target_os = "linux") && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load and deserialize a TOML configuration file.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load a config from an optional resolved path, falling back to defaults.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) => load_toml(p),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    #[serde(default)]
    struct TestConfig {
        name: String,
        count: u32,
    }

    #[test]
    fn load_toml_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"engine\"\ncount = 3").unwrap();

        let config: TestConfig = load_toml(file.path()).unwrap();
        assert_eq!(config.name, "engine");
        assert_eq!(config.count, 3);
    }

    #[test]
    fn load_or_default_without_path() {
        let config: TestConfig = load_or_default(None).unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result: Result<TestConfig> = load_toml(Path::new("/nonexistent/sonolink.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn cli_arg_wins_resolution() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(resolve_config_file(Some(path)), Some(path.to_path_buf()));
    }
}
