//! CityGuide Store — SQLite persistence and tour progress.

pub mod fixtures;
pub mod password;
pub mod progress;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use fixtures::FixtureReport;
pub use progress::{TourRun, TourState};
pub use sqlite::SqliteStore;
pub use types::*;
