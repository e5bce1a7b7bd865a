//! Configuration schema types for `deskpet.toml`
//!
//! Every section and field is optional; missing values take the defaults
//! below.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::sheet::LoadStrategy;

/// Where the asset pack lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Application root holding the pack folder
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Pack folder name, created when missing
    #[serde(default = "default_pack")]
    pub pack: String,
    /// Mandatory folders from the pack down to the graphics root
    #[serde(default = "default_gfx_path")]
    pub gfx_path: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            pack: default_pack(),
            gfx_path: default_gfx_path(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_pack() -> String {
    "VPetSimulator".to_string()
}

fn default_gfx_path() -> Vec<String> {
    ["mod", "0000_core", "pet", "vup"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Sprite sheet cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Provider sub-folder inside the cache directory
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Square cell size frames are rescaled to
    #[serde(default = "default_cell_size")]
    pub cell_size: u32,
    /// Number of cache workers
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            provider: default_provider(),
            cell_size: default_cell_size(),
            jobs: default_jobs(),
        }
    }
}

impl CacheConfig {
    /// Folder holding this provider's atlases.
    pub fn provider_dir(&self) -> PathBuf {
        self.dir.join(&self.provider)
    }
}

fn default_cache_dir() -> PathBuf {
    env::var("XDG_CACHE_HOME")
        .map(|dir| PathBuf::from(dir).join("deskpet"))
        .unwrap_or_else(|_| PathBuf::from(".deskpet-cache"))
}

fn default_provider() -> String {
    "vpetsim".to_string()
}

fn default_cell_size() -> u32 {
    500
}

fn default_jobs() -> usize {
    crate::cache::DEFAULT_CACHE_JOBS
}

/// Playback and rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How atlases are loaded and unloaded
    #[serde(default)]
    pub load_strategy: LoadStrategy,
    /// Render clock interval
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,
    /// Ticks longer than this are dropped
    #[serde(default = "default_anomaly_threshold_ms")]
    pub anomaly_threshold_ms: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            load_strategy: LoadStrategy::default(),
            render_interval_ms: default_render_interval_ms(),
            anomaly_threshold_ms: default_anomaly_threshold_ms(),
        }
    }
}

fn default_render_interval_ms() -> u64 {
    25
}

fn default_anomaly_threshold_ms() -> f64 {
    crate::playback::DEFAULT_ANOMALY_THRESHOLD_MS
}

/// Simulation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Target loop interval
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_tick_ms() -> u64 {
    16
}

/// Complete deskpet.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeskpetConfig {
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "cache.cell_size")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deskpet.toml: '{}' {}", self.field, self.message)
    }
}

impl DeskpetConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut error = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        if self.assets.pack.is_empty() {
            error("assets.pack", "must be a non-empty string");
        }
        if self.assets.gfx_path.iter().any(String::is_empty) {
            error("assets.gfx_path", "must not contain empty folder names");
        }
        if self.cache.provider.is_empty() {
            error("cache.provider", "must be a non-empty string");
        }
        if self.cache.cell_size == 0 {
            error("cache.cell_size", "must be a positive integer");
        }
        if self.cache.jobs == 0 {
            error("cache.jobs", "must be a positive integer");
        }
        if self.playback.render_interval_ms == 0 {
            error("playback.render_interval_ms", "must be a positive integer");
        }
        let threshold = self.playback.anomaly_threshold_ms;
        if !threshold.is_finite() || threshold <= 0.0 {
            error("playback.anomaly_threshold_ms", "must be a positive number");
        }
        if self.simulation.tick_ms == 0 {
            error("simulation.tick_ms", "must be a positive integer");
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: DeskpetConfig = toml::from_str("").unwrap();
        assert_eq!(config.assets.pack, "VPetSimulator");
        assert_eq!(config.assets.gfx_path, vec!["mod", "0000_core", "pet", "vup"]);
        assert_eq!(config.cache.provider, "vpetsim");
        assert_eq!(config.cache.cell_size, 500);
        assert_eq!(config.cache.jobs, 4);
        assert_eq!(config.playback.load_strategy, LoadStrategy::MemoryHotLoad);
        assert_eq!(config.playback.render_interval_ms, 25);
        assert_eq!(config.simulation.tick_ms, 16);
        assert!(config.is_valid());
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[assets]
root = "/opt/pet"
pack = "MyPack"
gfx_path = ["pet"]

[cache]
dir = "/tmp/pet-cache"
provider = "mine"
cell_size = 256
jobs = 2

[playback]
load_strategy = "hot-load"
render_interval_ms = 40
anomaly_threshold_ms = 500.0

[simulation]
tick_ms = 20
"#;
        let config: DeskpetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.assets.root, PathBuf::from("/opt/pet"));
        assert_eq!(config.assets.gfx_path, vec!["pet"]);
        assert_eq!(config.cache.provider_dir(), PathBuf::from("/tmp/pet-cache/mine"));
        assert_eq!(config.cache.cell_size, 256);
        assert_eq!(config.playback.load_strategy, LoadStrategy::HotLoad);
        assert_eq!(config.playback.anomaly_threshold_ms, 500.0);
        assert_eq!(config.simulation.tick_ms, 20);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: Result<DeskpetConfig, _> = toml::from_str("[playback]\nload_strategy = \"sometimes\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = DeskpetConfig::default();
        config.cache.cell_size = 0;
        config.cache.jobs = 0;
        config.simulation.tick_ms = 0;
        config.playback.anomaly_threshold_ms = f64::NAN;

        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "cache.cell_size",
                "cache.jobs",
                "playback.anomaly_threshold_ms",
                "simulation.tick_ms"
            ]
        );
    }

    #[test]
    fn test_validation_error_display() {
        let error = ConfigValidationError {
            field: "cache.cell_size".to_string(),
            message: "must be a positive integer".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "deskpet.toml: 'cache.cell_size' must be a positive integer"
        );
    }
}
