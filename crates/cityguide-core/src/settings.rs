//! Local key/value settings: last logged-in user, theme style, interface language.
//!
//! Stored as a small JSON object next to the database. A missing or unreadable
//! file yields defaults; every setter rewrites the whole file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Light or dark UI theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeStyle {
    #[default]
    Light,
    Dark,
}

/// The user remembered across restarts. Never holds a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUser {
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub style: ThemeStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub code: String,
}

/// Settings file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<LastUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageEntry>,
}

impl Settings {
    pub fn theme_style(&self) -> ThemeStyle {
        self.theme.as_ref().map(|t| t.style).unwrap_or_default()
    }

    pub fn language_code(&self) -> &str {
        self.language.as_ref().map(|l| l.code.as_str()).unwrap_or("ru")
    }
}

/// Handle to the on-disk settings file.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings, falling back to defaults.
    pub fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings {}: {}", self.path.display(), e);
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let data = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, data)?;
        debug!("Settings saved to {}", self.path.display());
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut settings = self.load();
        f(&mut settings);
        self.save(&settings)
    }

    pub fn last_user(&self) -> Option<LastUser> {
        self.load().user
    }

    pub fn set_last_user(&self, username: &str, is_admin: bool) -> Result<()> {
        self.update(|s| {
            s.user = Some(LastUser {
                username: username.to_string(),
                is_admin,
            })
        })
    }

    pub fn clear_last_user(&self) -> Result<()> {
        self.update(|s| s.user = None)
    }

    pub fn theme_style(&self) -> ThemeStyle {
        self.load().theme_style()
    }

    pub fn set_theme_style(&self, style: ThemeStyle) -> Result<()> {
        self.update(|s| s.theme = Some(ThemeEntry { style }))
    }

    pub fn language_code(&self) -> String {
        self.load().language_code().to_string()
    }

    pub fn set_language_code(&self, code: &str) -> Result<()> {
        self.update(|s| {
            s.language = Some(LanguageEntry {
                code: code.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.json"));

        assert_eq!(file.last_user(), None);
        assert_eq!(file.theme_style(), ThemeStyle::Light);
        assert_eq!(file.language_code(), "ru");
    }

    #[test]
    fn test_values_persist_independently() {
        let dir = TempDir::new().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.json"));

        file.set_theme_style(ThemeStyle::Dark).unwrap();
        file.set_last_user("anna", false).unwrap();
        file.set_language_code("en").unwrap();

        let reopened = SettingsFile::new(file.path());
        assert_eq!(reopened.theme_style(), ThemeStyle::Dark);
        assert_eq!(reopened.language_code(), "en");
        assert_eq!(
            reopened.last_user(),
            Some(LastUser {
                username: "anna".into(),
                is_admin: false
            })
        );

        reopened.clear_last_user().unwrap();
        assert_eq!(file.last_user(), None);
        assert_eq!(file.theme_style(), ThemeStyle::Dark);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let file = SettingsFile::new(&path);
        assert_eq!(file.load(), Settings::default());

        file.set_theme_style(ThemeStyle::Dark).unwrap();
        assert_eq!(file.theme_style(), ThemeStyle::Dark);
    }
}
