//! SQLite-backed store for places, tours, cities, users and tour progress.
//!
//! One connection guarded by a mutex. Every public method locks it for its
//! whole duration; operations touching several rows run in one transaction.

mod cities;
mod places;
mod tours;
mod users;

pub(crate) use cities::mark_city_downloaded;
pub(crate) use places::insert_place;
pub(crate) use tours::{insert_tour_with_points, renumber_points};

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::password::hash_password;
use crate::schema::{
    BACKFILL_SQL, COLUMN_MIGRATIONS, DEFAULT_ADMIN_FIRST_NAME, DEFAULT_ADMIN_PASSWORD,
    DEFAULT_ADMIN_USERNAME, DEFAULT_CITIES, SCHEMA_SQL,
};
use crate::types::StoreStats;
use cityguide_core::{Error, Result};

/// Handle to the local CityGuide database. Share it behind an `Arc`.
#[derive(Debug)]
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
}

pub(crate) fn db(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Image URL lists are stored as JSON array strings.
pub(crate) fn encode_urls(urls: &[String]) -> String {
    serde_json::to_string(urls).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn decode_urls(raw: Option<String>) -> Vec<String> {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

impl SqliteStore {
    /// Open or create the database file, then bring its schema up to date.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| Error::Storage(e.to_string()))?;
        }

        let conn = Connection::open(&db_path).map_err(db)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db)?;

        let store = Self::from_connection(conn, db_path)?;
        let stats = store.get_stats()?;
        info!(
            "SqliteStore initialized: {} cities, {} places, {} tours, {} users, path={}",
            stats.cities,
            stats.places,
            stats.tours,
            stats.users,
            store.db_path.display()
        );
        Ok(store)
    }

    /// Fresh in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(mut conn: Connection, db_path: PathBuf) -> Result<Self> {
        Self::init_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Schema initialization
    // ---------------------------------------------------------------

    /// Create tables, apply column migrations, backfill and seed.
    ///
    /// Safe to run against a database in any earlier state.
    fn init_schema(conn: &mut Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        for (table, column, decl) in COLUMN_MIGRATIONS {
            Self::add_column_if_missing(conn, table, column, decl)?;
        }
        conn.execute_batch(BACKFILL_SQL).map_err(db)?;

        Self::seed_admin(conn)?;
        Self::seed_cities(conn)?;
        Ok(())
    }

    fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
        if table_columns(conn, table)?.iter().any(|c| c == column) {
            return Ok(());
        }
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
        match conn.execute(&sql, []) {
            Ok(_) => {
                info!("Added column {}.{}", table, column);
                Ok(())
            }
            Err(e) if e.to_string().contains("duplicate column") => {
                debug!("Column {}.{} already present", table, column);
                Ok(())
            }
            Err(e) => Err(Error::Database(format!(
                "Migration {}.{} failed: {}",
                table, column, e
            ))),
        }
    }

    fn seed_admin(conn: &Connection) -> Result<()> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(db)?;
        if count > 0 {
            return Ok(());
        }
        let hash = hash_password(DEFAULT_ADMIN_PASSWORD)?;
        conn.execute(
            "INSERT INTO users (username, password_hash, role, first_name, last_name, email, secret_word) \
             VALUES (?1, ?2, 'admin', ?3, '', '', '')",
            params![DEFAULT_ADMIN_USERNAME, hash, DEFAULT_ADMIN_FIRST_NAME],
        )
        .map_err(db)?;
        info!("Seeded built-in admin user");
        Ok(())
    }

    fn seed_cities(conn: &mut Connection) -> Result<()> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))
            .map_err(db)?;
        if count > 0 {
            return Ok(());
        }
        let tx = conn.transaction().map_err(db)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO cities (id, name, country, center_lat, center_lon, \
                     is_downloaded, download_size, last_update, is_active) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '', ?8)",
                )
                .map_err(db)?;
            for city in DEFAULT_CITIES {
                stmt.execute(params![
                    city.id,
                    city.name,
                    city.country,
                    city.center_lat,
                    city.center_lon,
                    city.is_downloaded,
                    city.download_size,
                    city.is_active,
                ])
                .map_err(db)?;
            }
        }
        tx.commit().map_err(db)?;
        info!("Seeded {} default cities", DEFAULT_CITIES.len());
        Ok(())
    }

    /// Column names of a table, in declaration order.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        table_columns(&conn, table)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .map_err(db)
        };
        Ok(StoreStats {
            cities: count("cities")?,
            places: count("places")?,
            tours: count("tours")?,
            tour_points: count("tour_points")?,
            reviews: count("reviews")?,
            favorites: count("favorites")?,
            users: count("users")?,
            support_messages: count("support_messages")?,
            db_path: self.db_path.to_string_lossy().to_string(),
        })
    }
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(db)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1)).map_err(db)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db)
}
