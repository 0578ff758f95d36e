//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.pairsync/
//!   config.yaml     (mode 0600, optional, defaults apply when absent)
//!   store/          (default content store root)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home, used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Watcher timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub tick_interval_ms: u64,
    /// Grace before a non-primary target is reported removed.
    pub removal_grace_ms: u64,
    /// Upper bound of the suppression window after a zone transition starts.
    pub zone_suppression_ms: u64,
    /// Settle delay after a zone transition ends.
    pub zone_settle_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            removal_grace_ms: 1_000,
            zone_suppression_ms: 120_000,
            zone_settle_ms: 2_500,
        }
    }
}

impl WatchSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn removal_grace(&self) -> Duration {
        Duration::from_millis(self.removal_grace_ms)
    }

    pub fn zone_suppression(&self) -> Duration {
        Duration::from_millis(self.zone_suppression_ms)
    }

    pub fn zone_settle(&self) -> Duration {
        Duration::from_millis(self.zone_settle_ms)
    }
}

/// Orchestrator timing and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySettings {
    pub resolve_parallelism: usize,
    pub fetch_rounds: usize,
    pub fetch_retry_delay_ms: u64,
    pub prior_apply_poll_ms: u64,
    pub draw_wait_timeout_ms: u64,
    pub revert_timeout_ms: u64,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            resolve_parallelism: 4,
            fetch_rounds: 10,
            fetch_retry_delay_ms: 2_000,
            prior_apply_poll_ms: 250,
            draw_wait_timeout_ms: 30_000,
            revert_timeout_ms: 60_000,
        }
    }
}

impl ApplySettings {
    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    pub fn prior_apply_poll(&self) -> Duration {
        Duration::from_millis(self.prior_apply_poll_ms)
    }

    pub fn draw_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.draw_wait_timeout_ms)
    }

    pub fn revert_timeout(&self) -> Duration {
        Duration::from_millis(self.revert_timeout_ms)
    }
}

/// Content store location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub watch: WatchSettings,
    pub apply: ApplySettings,
    pub store: StoreSettings,
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "watch.tick_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.apply.resolve_parallelism == 0 {
            return Err(ConfigError::Invalid {
                field: "apply.resolve_parallelism",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.apply.fetch_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "apply.fetch_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Content store root, defaulting to `<home>/.pairsync/store`.
    pub fn store_root_at(&self, home: &Path) -> PathBuf {
        self.store
            .root
            .clone()
            .unwrap_or_else(|| pairsync_root(home).join("store"))
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.pairsync/`
pub fn pairsync_root(home: &Path) -> PathBuf {
    home.join(".pairsync")
}

/// `<home>/.pairsync/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    pairsync_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load `config.yaml`, returning defaults when the file does not exist.
///
/// Returns `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| config_io_err(&path, e))?;
    let config: SyncConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `<home>/.pairsync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SyncConfig) -> Result<PathBuf, ConfigError> {
    config.validate()?;
    let root = pairsync_root(home);
    std::fs::create_dir_all(&root).map_err(|e| config_io_err(&root, e))?;

    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| config_io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| config_io_err(&path, e))?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &SyncConfig) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().expect("tempdir");
        let config = load_at(home.path()).expect("load");
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.apply.fetch_rounds, 10);
        assert_eq!(config.apply.prior_apply_poll(), Duration::from_millis(250));
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(pairsync_root(home.path())).unwrap();
        std::fs::write(
            config_path_at(home.path()),
            "apply:\n  fetch_rounds: 3\n",
        )
        .unwrap();

        let config = load_at(home.path()).expect("load");
        assert_eq!(config.apply.fetch_rounds, 3);
        assert_eq!(config.apply.resolve_parallelism, 4);
        assert_eq!(config.watch, WatchSettings::default());
    }

    #[test]
    fn save_and_load_roundtrip_cleans_tmp() {
        let home = TempDir::new().expect("tempdir");
        let mut config = SyncConfig::default();
        config.watch.removal_grace_ms = 1_500;
        let path = save_at(home.path(), &config).expect("save");

        assert!(!path.with_file_name("config.yaml.tmp").exists());
        assert_eq!(load_at(home.path()).expect("load"), config);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(pairsync_root(home.path())).unwrap();
        std::fs::write(config_path_at(home.path()), "apply: [unclosed").unwrap();

        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let mut config = SyncConfig::default();
        config.apply.resolve_parallelism = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "apply.resolve_parallelism",
                ..
            }
        ));
    }

    #[test]
    fn store_root_defaults_under_home() {
        let config = SyncConfig::default();
        let root = config.store_root_at(Path::new("/home/someone"));
        assert_eq!(root, PathBuf::from("/home/someone/.pairsync/store"));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
