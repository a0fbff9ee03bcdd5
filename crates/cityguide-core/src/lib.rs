//! CityGuide Core — shared error type and configuration.

pub mod config;
pub mod error;
pub mod settings;

pub use config::{CityGuideConfig, DataPaths};
pub use error::{Error, Result};
pub use settings::{LastUser, Settings, SettingsFile, ThemeStyle};
