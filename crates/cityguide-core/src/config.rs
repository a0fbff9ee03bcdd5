//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DEFAULT_USER_ID: i64 = 1;

/// Paths to all CityGuide data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database file (`data/cityguide.db`).
    pub db_file: PathBuf,
    /// Local settings (`data/settings.json`).
    pub settings_file: PathBuf,
    /// JSON fixtures for places and tours (`data/fixtures/`).
    pub fixtures: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db_file: root.join("cityguide.db"),
            settings_file: root.join("settings.json"),
            fixtures: root.join("fixtures"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// Point fixture loading at a different directory.
    pub fn with_fixtures(mut self, fixtures: impl Into<PathBuf>) -> Self {
        self.fixtures = fixtures.into();
        self
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.fixtures)?;
        Ok(())
    }
}

/// Top-level CityGuide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityGuideConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// User id used for single-user bookkeeping (favorites, progress, current city).
    pub default_user_id: i64,
}

impl CityGuideConfig {
    /// Create configuration from environment and defaults.
    ///
    /// A `CITYGUIDE_DEFAULT_USER` that is not a positive integer is
    /// `Error::Config`.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let mut data_paths = DataPaths::new(data_dir)?;
        if let Ok(dir) = std::env::var("CITYGUIDE_FIXTURES_DIR") {
            data_paths = data_paths.with_fixtures(dir);
        }

        let default_user = std::env::var("CITYGUIDE_DEFAULT_USER").ok();
        let default_user_id = parse_default_user(default_user.as_deref())?;

        Ok(Self {
            data_paths,
            default_user_id,
        })
    }
}

fn parse_default_user(raw: Option<&str>) -> Result<i64> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_USER_ID);
    };
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::Config(format!(
            "CITYGUIDE_DEFAULT_USER must be a positive integer, got {:?}",
            raw
        ))),
    }
}
