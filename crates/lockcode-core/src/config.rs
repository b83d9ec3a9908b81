//! Configuration resolution for `LockCode`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/lockcode/settings.json)
//! 3. Project config (.lockcode/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files are merged key by key, so a project file only needs the keys it
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::allocator::DEFAULT_CAPACITY;
use crate::engine::{DEFAULT_CODE_LENGTH, EngineLimits};
use crate::error::{Error, Result};
use crate::registry::DeviceConfig;

/// Complete `LockCode` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            fleet: FleetConfig::default(),
            reconcile: ReconcileConfig::default(),
            devices: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Lock engine limits and device I/O settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots per device.
    pub capacity: u16,
    /// Digits per key code.
    pub code_length: usize,
    /// Timeout applied by drivers to each device operation.
    pub io_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            code_length: DEFAULT_CODE_LENGTH,
            io_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub const fn limits(&self) -> EngineLimits {
        EngineLimits {
            capacity: self.capacity,
            code_length: self.code_length,
        }
    }

    pub const fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// Fleet fan-out settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Only devices whose name contains this (case-insensitive) take part
    /// in "all devices" operations.
    pub lock_name_filter: Option<String>,
}

/// Reconciliation queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub database_path: Option<PathBuf>,
    /// Delay between queue polls in watch mode.
    pub poll_interval_secs: u64,
    /// Upper bound on devices reconciled at the same time.
    pub max_concurrency: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            poll_interval_secs: 60,
            max_concurrency: 4,
        }
    }
}

impl ReconcileConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            layers.push(global_path);
        }
    }
    if let Some(dir) = project_dir {
        let project_path = dir.join(".lockcode").join("settings.json");
        if project_path.exists() {
            layers.push(project_path);
        }
    }
    let mut config = load_layers(&layers)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load defaults overlaid with the given files, in order.
pub fn load_layers(paths: &[PathBuf]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in paths {
        merge_json(&mut merged, load_config_file(path)?);
    }
    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Default location of the reconciliation database.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("reconcile.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".lockcode"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/lockcode"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("lockcode"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively overlay `overlay` onto `base`. Objects merge per key; any
/// other value (arrays included) replaces the base value.
fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `LOCKCODE_*` overrides. Unparseable numeric values are ignored.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(n) = var("LOCKCODE_CAPACITY").and_then(|v| v.parse().ok()) {
        config.engine.capacity = n;
    }
    if let Some(n) = var("LOCKCODE_CODE_LENGTH").and_then(|v| v.parse().ok()) {
        config.engine.code_length = n;
    }
    if let Some(n) = var("LOCKCODE_IO_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.engine.io_timeout_secs = n;
    }
    if let Some(val) = var("LOCKCODE_LOCK_FILTER") {
        config.fleet.lock_name_filter = Some(val).filter(|v| !v.is_empty());
    }
    if let Some(val) = var("LOCKCODE_DB_PATH") {
        config.reconcile.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("LOCKCODE_LOG_LEVEL") {
        config.log_level = val;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::drivers::DriverConfig;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_match_lock_hardware() {
        let config = Config::default();
        assert_eq!(config.engine.capacity, 250);
        assert_eq!(config.engine.code_length, 8);
        assert_eq!(config.reconcile.poll_interval_secs, 60);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn later_layers_override_only_their_keys() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(
            dir.path(),
            "global.json",
            r#"{"engine": {"capacity": 30, "io_timeout_secs": 5}}"#,
        );
        let project = write(dir.path(), "project.json", r#"{"engine": {"capacity": 100}}"#);

        let config = load_layers(&[global, project]).unwrap();
        assert_eq!(config.engine.capacity, 100);
        assert_eq!(config.engine.io_timeout_secs, 5);
        assert_eq!(config.engine.code_length, 8);
    }

    #[test]
    fn devices_are_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "settings.json",
            r#"{"devices": [
                {"id": 12, "name": "Front Door Lock", "driver": {"kind": "memory"}},
                {"id": 3, "name": "Back Door Lock", "driver": {"kind": "file", "path": "/tmp/3.json"}}
            ]}"#,
        );

        let config = load_layers(&[path]).unwrap();
        let ids: Vec<i64> = config.devices.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![12, 3]);
        assert_eq!(config.devices[0].driver, DriverConfig::Memory);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.json", "{ nope");
        assert!(matches!(load_layers(&[path]), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LOCKCODE_CAPACITY", "40"),
            ("LOCKCODE_CODE_LENGTH", "not-a-number"),
            ("LOCKCODE_LOCK_FILTER", "lock"),
            ("LOCKCODE_DB_PATH", "/var/lib/lockcode/queue.db"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.engine.capacity, 40);
        assert_eq!(config.engine.code_length, 8);
        assert_eq!(config.fleet.lock_name_filter.as_deref(), Some("lock"));
        assert_eq!(
            config.reconcile.database_path,
            Some(PathBuf::from("/var/lib/lockcode/queue.db"))
        );
    }
}
