//! Configuration loading and discovery for `deskpet.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::DeskpetConfig;
use crate::sheet::LoadStrategy;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for during discovery.
pub const CONFIG_FILENAME: &str = "deskpet.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse deskpet.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override the application root
    pub root: Option<PathBuf>,
    /// Override the cache directory
    pub cache_dir: Option<PathBuf>,
    /// Override the cell size
    pub cell_size: Option<u32>,
    /// Override the number of cache workers
    pub jobs: Option<usize>,
    /// Override the load strategy
    pub load_strategy: Option<LoadStrategy>,
}

/// Find deskpet.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for deskpet.toml
/// 2. Check XDG_CONFIG_HOME/deskpet/deskpet.toml (or ~/.config/deskpet/deskpet.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find deskpet.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("deskpet").join(CONFIG_FILENAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find deskpet.toml by walking up from `start`.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a deskpet.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses
/// [`find_config`] and falls back to [`default_config`] when nothing is
/// found.
///
/// A relative `assets.root` or `cache.dir` is resolved against the folder
/// holding the file.
pub fn load_config(path: Option<&Path>) -> Result<DeskpetConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

fn load_config_file(path: &Path) -> Result<DeskpetConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let mut config: DeskpetConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    if let Some(root) = config_root(path) {
        config.assets.root = resolve_path(root, &config.assets.root);
        config.cache.dir = resolve_path(root, &config.cache.dir);
    }
    Ok(config)
}

/// Configuration used when no deskpet.toml is found.
pub fn default_config() -> DeskpetConfig {
    DeskpetConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut DeskpetConfig, overrides: &CliOverrides) {
    if let Some(ref root) = overrides.root {
        config.assets.root = root.clone();
    }

    if let Some(ref cache_dir) = overrides.cache_dir {
        config.cache.dir = cache_dir.clone();
    }

    if let Some(cell_size) = overrides.cell_size {
        config.cache.cell_size = cell_size;
    }

    if let Some(jobs) = overrides.jobs {
        config.cache.jobs = jobs;
    }

    if let Some(strategy) = overrides.load_strategy {
        config.playback.load_strategy = strategy;
    }
}

/// Directory holding a config file.
pub fn config_root(config_path: &Path) -> Option<&Path> {
    config_path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Resolve `path` against `root` unless it is absolute.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILENAME);
        File::create(&config_path)
            .expect("should create config file")
            .write_all(contents.as_bytes())
            .expect("should write config content");
        config_path
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[cache]\ncell_size = 64\n");

        let subdir = temp.path().join("assets").join("pet");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        assert_eq!(find_config_from(subdir), Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        assert_eq!(find_config_from(temp.path().to_path_buf()), None);
    }

    #[test]
    #[serial]
    fn test_find_xdg_config() {
        let temp = TempDir::new().expect("should create temp dir");
        let dir = temp.path().join("deskpet");
        fs::create_dir_all(&dir).expect("should create xdg dir");
        let config_path = write_config(&dir, "");

        let previous = env::var_os("XDG_CONFIG_HOME");
        env::set_var("XDG_CONFIG_HOME", temp.path());
        let found = find_xdg_config();
        match previous {
            Some(value) => env::set_var("XDG_CONFIG_HOME", value),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_load_config_resolves_relative_paths() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[assets]
root = "game"

[cache]
dir = "/var/cache/deskpet"
cell_size = 128
"#,
        );

        let config = load_config(Some(&config_path)).expect("should load valid config");
        assert_eq!(config.assets.root, temp.path().join("game"));
        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/deskpet"));
        assert_eq!(config.cache.cell_size, 128);
    }

    #[test]
    fn test_load_config_missing_file_errors() {
        let temp = TempDir::new().expect("should create temp dir");
        let result = load_config(Some(&temp.path().join("nonexistent.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "this is not valid toml {{{");
        assert!(matches!(load_config(Some(&config_path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[cache]\ncell_size = 0\njobs = 0\n");

        match load_config(Some(&config_path)) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut config = default_config();
        let overrides = CliOverrides {
            root: Some(PathBuf::from("/games/pet")),
            cell_size: Some(250),
            load_strategy: Some(LoadStrategy::Eager),
            ..Default::default()
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.assets.root, PathBuf::from("/games/pet"));
        assert_eq!(config.cache.cell_size, 250);
        assert_eq!(config.cache.jobs, 4);
        assert_eq!(config.playback.load_strategy, LoadStrategy::Eager);
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/project");
        assert_eq!(resolve_path(root, Path::new("/other")), PathBuf::from("/other"));
        assert_eq!(resolve_path(root, Path::new("cache")), PathBuf::from("/project/cache"));
    }

    #[test]
    fn test_config_root() {
        assert_eq!(config_root(Path::new("/project/deskpet.toml")), Some(Path::new("/project")));
        assert_eq!(config_root(Path::new("deskpet.toml")), None);
    }
}
