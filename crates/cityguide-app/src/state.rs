//! Shared application context.

use std::sync::Arc;

use cityguide_core::{CityGuideConfig, Result, SettingsFile};
use cityguide_store::SqliteStore;
use tracing::info;

use crate::session::SessionService;

/// Everything a front end needs, constructed once and passed explicitly.
pub struct AppContext {
    pub config: CityGuideConfig,
    pub store: Arc<SqliteStore>,
    pub settings: SettingsFile,
}

impl AppContext {
    /// Open the database (migrating and seeding it) and load default fixtures.
    pub fn open(config: CityGuideConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.data_paths.db_file)?;
        let report = store.load_default_fixtures(&config.data_paths.fixtures)?;
        if report.places + report.tours > 0 {
            info!(
                "Fixtures loaded from {}: {} places, {} tours",
                config.data_paths.fixtures.display(),
                report.places,
                report.tours
            );
        }
        let settings = SettingsFile::new(&config.data_paths.settings_file);
        Ok(Self {
            config,
            store: Arc::new(store),
            settings,
        })
    }

    pub fn session(&self) -> SessionService {
        SessionService::new(self.store.clone(), self.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_database_and_settings_handle() {
        let dir = TempDir::new().unwrap();
        let config = CityGuideConfig::from_env(dir.path()).unwrap();
        let ctx = AppContext::open(config).unwrap();

        assert!(ctx.config.data_paths.db_file.exists());
        assert_eq!(ctx.settings.path(), dir.path().join("settings.json"));
        assert_eq!(ctx.store.get_active_city().unwrap().unwrap().id, 1);

        let session = ctx.session();
        assert!(session.current_user().unwrap().is_none());
    }
}
