//! Stored-configuration files
//!
//! Three file roles on stable storage: `intended` (the user's durable
//! target), `backup` (exists only while an apply awaits confirmation; its
//! presence at startup means a previous session died mid-confirmation), and
//! `legacy` (older store, read-only). Each file holds a list of
//! configurations; loading picks the entry that structurally matches the
//! live topology, so configurations for other docking setups survive a save.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::randr::{Config, RandrError, Result, ScreenSnapshot};

/// Locations of the three configuration files.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// The durable target configuration
    pub intended: PathBuf,
    /// The rollback target of an unconfirmed change
    pub backup: PathBuf,
    /// Old-format fallback, only ever read
    pub legacy: PathBuf,
}

impl ConfigPaths {
    /// The standard per-user locations.
    pub fn from_user_config_dir() -> Option<ConfigPaths> {
        let dir = dirs::config_dir()?;
        Some(ConfigPaths::under(&dir))
    }

    /// File locations under an arbitrary directory.
    pub fn under(dir: &Path) -> ConfigPaths {
        ConfigPaths {
            intended: dir.join("cinnamon-monitors.json"),
            backup: dir.join("cinnamon-monitors.json.backup"),
            legacy: dir.join("monitors.json"),
        }
    }

    /// Whether an unconfirmed change is pending.
    pub fn backup_exists(&self) -> bool {
        self.backup.exists()
    }
}

fn read_stored(path: &Path) -> Result<Vec<Config>> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| RandrError::Parse(e.to_string()))
}

fn write_stored(path: &Path, configs: &[Config]) -> Result<()> {
    let serialized =
        serde_json::to_string_pretty(configs).map_err(|e| RandrError::Parse(e.to_string()))?;

    // Write-then-rename so a crash never leaves a truncated store behind.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serialized)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load the stored configuration matching the live topology.
///
/// A missing file surfaces as [`RandrError::Io`] with `NotFound`; a present
/// file with no structurally matching entry as
/// [`RandrError::NoMatchingConfig`].
pub fn load_matching(path: &Path, snapshot: &ScreenSnapshot) -> Result<Config> {
    let stored = read_stored(path)?;
    stored
        .into_iter()
        .find(|c| c.matches_snapshot(snapshot))
        .ok_or(RandrError::NoMatchingConfig)
}

/// Persist `config`, replacing the entry for the same topology or appending
/// a new one.
pub fn save(path: &Path, config: &Config) -> Result<()> {
    let mut stored = match read_stored(path) {
        Ok(stored) => stored,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(RandrError::Parse(reason)) => {
            // A corrupt store is rebuilt rather than kept fatal.
            debug!("discarding unreadable configuration store: {reason}");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    match stored.iter_mut().find(|c| c.matches(config)) {
        Some(slot) => *slot = config.clone(),
        None => stored.push(config.clone()),
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_stored(path, &stored)
}

/// Capture `current` as the rollback target, unless a backup already exists
/// (an earlier unconfirmed change still owns the rollback slot).
pub fn write_backup_unless_present(paths: &ConfigPaths, current: &Config) -> Result<()> {
    if paths.backup_exists() {
        return Ok(());
    }
    if let Some(parent) = paths.backup.parent() {
        fs::create_dir_all(parent)?;
    }
    write_stored(&paths.backup, std::slice::from_ref(current))
}

/// Move the backup over the intended file, making the rollback target
/// durable again.
pub fn promote_backup(paths: &ConfigPaths) -> Result<()> {
    fs::rename(&paths.backup, &paths.intended)?;
    Ok(())
}

/// Drop the backup: the user accepted the new configuration.
pub fn discard_backup(paths: &ConfigPaths) -> Result<()> {
    match fs::remove_file(&paths.backup) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove the intended file. Used when a restore discovers there never was
/// an original configuration (first login): the speculative, rejected
/// intended file must not survive.
pub fn remove_intended(paths: &ConfigPaths) {
    let _ = fs::remove_file(&paths.intended);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randr::testing::{snapshot_with, FakeOutput};

    fn snapshot() -> ScreenSnapshot {
        snapshot_with(vec![
            FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0),
            FakeOutput::external("HDMI-1", 2560, 1440).active_at(1920, 0),
        ])
    }

    fn other_snapshot() -> ScreenSnapshot {
        snapshot_with(vec![FakeOutput::laptop("eDP-1", 1920, 1080).active_at(0, 0)])
    }

    #[test]
    fn test_save_then_load_matching() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());
        let snapshot = snapshot();
        let config = Config::new_current(&snapshot);

        save(&paths.intended, &config).unwrap();

        let loaded = load_matching(&paths.intended, &snapshot).unwrap();
        assert!(loaded.equals(&config));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());

        let err = load_matching(&paths.intended, &snapshot()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_topology_mismatch_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());
        save(&paths.intended, &Config::new_current(&snapshot())).unwrap();

        let err = load_matching(&paths.intended, &other_snapshot()).unwrap_err();
        assert!(err.is_no_match());
    }

    #[test]
    fn test_save_keeps_other_topologies() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());

        let docked = Config::new_current(&snapshot());
        let mobile = Config::new_current(&other_snapshot());
        save(&paths.intended, &docked).unwrap();
        save(&paths.intended, &mobile).unwrap();

        // Both hardware setups load their own entry.
        assert!(load_matching(&paths.intended, &snapshot())
            .unwrap()
            .equals(&docked));
        assert!(load_matching(&paths.intended, &other_snapshot())
            .unwrap()
            .equals(&mobile));
    }

    #[test]
    fn test_save_replaces_same_topology() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());
        let snapshot = snapshot();

        let mut first = Config::new_current(&snapshot);
        save(&paths.intended, &first).unwrap();

        first.output_mut("HDMI-1").unwrap().active = false;
        save(&paths.intended, &first).unwrap();

        let stored = read_stored(&paths.intended).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].output("HDMI-1").unwrap().active);
    }

    #[test]
    fn test_backup_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());
        let snapshot = snapshot();
        let current = Config::new_current(&snapshot);

        assert!(!paths.backup_exists());
        write_backup_unless_present(&paths, &current).unwrap();
        assert!(paths.backup_exists());

        // A second write does not clobber the rollback target.
        let mut altered = current.clone();
        altered.output_mut("HDMI-1").unwrap().active = false;
        write_backup_unless_present(&paths, &altered).unwrap();
        assert!(load_matching(&paths.backup, &snapshot)
            .unwrap()
            .equals(&current));

        promote_backup(&paths).unwrap();
        assert!(!paths.backup_exists());
        assert!(load_matching(&paths.intended, &snapshot)
            .unwrap()
            .equals(&current));
    }

    #[test]
    fn test_discard_backup_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());
        assert!(discard_backup(&paths).is_ok());
    }

    #[test]
    fn test_promote_missing_backup_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::under(dir.path());
        let err = promote_backup(&paths).unwrap_err();
        assert!(err.is_not_found());
    }
}
