//! Shared state for one CLI invocation: resolved configuration, the fleet
//! controller built from it, and output preferences.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lockcode_core::config::{self, apply_env_overrides, load_layers};
use lockcode_core::drivers::DefaultDriverFactory;
use lockcode_core::{Config, DeviceRegistry, FleetController};
use lockcode_reconcile::ReconcileDatabase;

pub struct Context {
    pub config: Config,
    pub fleet: FleetController,
    pub device_id: Option<i64>,
    pub json: bool,
}

impl Context {
    /// Resolve configuration and build the fleet.
    ///
    /// With `--config`, that file replaces the global and project layers;
    /// environment overrides apply either way.
    pub fn load(
        config_path: Option<&Path>,
        device_id: Option<i64>,
        json: bool,
    ) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => {
                let mut config = load_layers(&[path.to_path_buf()])?;
                apply_env_overrides(&mut config, |key| std::env::var(key).ok());
                config
            }
            None => {
                let cwd = std::env::current_dir()?;
                config::load_config(Some(&cwd))?
            }
        };
        Self::from_config(config, device_id, json)
    }

    pub fn from_config(config: Config, device_id: Option<i64>, json: bool) -> anyhow::Result<Self> {
        let factory = DefaultDriverFactory {
            io_timeout: config.engine.io_timeout(),
        };
        let registry =
            DeviceRegistry::from_config(&config.devices, config.engine.limits(), &factory)?;
        let fleet = FleetController::new(Arc::new(registry))
            .with_lock_filter(config.fleet.lock_name_filter.clone());
        Ok(Self {
            config,
            fleet,
            device_id,
            json,
        })
    }

    /// The device named by `--device-id`, for commands that need exactly one.
    pub fn require_device(&self) -> anyhow::Result<i64> {
        self.device_id
            .ok_or_else(|| anyhow::anyhow!("This command requires --device-id"))
    }

    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        self.config
            .reconcile
            .database_path
            .clone()
            .or_else(config::database_path)
            .or_else(|| dirs::data_local_dir().map(|d| d.join("lockcode").join("reconcile.db")))
            .ok_or_else(|| {
                anyhow::anyhow!("Cannot determine database location; set reconcile.database_path")
            })
    }

    pub async fn open_database(&self) -> anyhow::Result<ReconcileDatabase> {
        let path = self.database_path()?;
        tracing::debug!(path = %path.display(), "Opening reconcile database");
        Ok(ReconcileDatabase::open(&path).await?)
    }
}
