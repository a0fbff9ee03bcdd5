//! Cities, the active-city invariant and per-user city bookkeeping.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{db, now_rfc3339, SqliteStore};
use crate::types::{City, NewCity, UserCity};
use cityguide_core::{Error, Result};

impl SqliteStore {
    /// The city currently selected, if any.
    pub fn get_active_city(&self) -> Result<Option<City>> {
        let conn = self.conn.lock();
        active_city(&conn)
    }

    pub fn get_city(&self, city_id: i64) -> Result<Option<City>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM cities WHERE id = ?1")
            .map_err(db)?
            .query_row(params![city_id], |row| Ok(Self::row_to_city(row)))
            .optional()
            .map_err(db)?;
        Ok(row)
    }

    pub fn list_cities(&self) -> Result<Vec<City>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT * FROM cities ORDER BY id").map_err(db)?;
        let rows = stmt
            .query_map([], |row| Ok(Self::row_to_city(row)))
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Make `city_id` the only active city and the user's current one.
    ///
    /// Fails with `NotFound` for an unknown city, leaving the previous
    /// selection untouched.
    pub fn set_active_city(&self, city_id: i64, user_id: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM cities WHERE id = ?1", params![city_id], |row| row.get(0))
            .optional()
            .map_err(db)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("city {}", city_id)));
        }

        tx.execute("UPDATE cities SET is_active = 0 WHERE is_active != 0", [])
            .map_err(db)?;
        tx.execute("UPDATE cities SET is_active = 1 WHERE id = ?1", params![city_id])
            .map_err(db)?;
        tx.execute(
            "UPDATE user_cities SET is_current = 0 WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(db)?;
        let updated = tx
            .execute(
                "UPDATE user_cities SET is_current = 1 WHERE user_id = ?1 AND city_id = ?2",
                params![user_id, city_id],
            )
            .map_err(db)?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO user_cities (user_id, city_id, downloaded_at, is_current) VALUES (?1, ?2, '', 1)",
                params![user_id, city_id],
            )
            .map_err(db)?;
        }
        tx.commit().map_err(db)?;
        debug!("Active city set to {} for user {}", city_id, user_id);
        Ok(())
    }

    /// Create a city. Returns the new id.
    pub fn add_city(&self, city: &NewCity) -> Result<i64> {
        let name = city.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("city name is required".into()));
        }
        let country = match city.country.trim() {
            "" => crate::schema::DEFAULT_COUNTRY,
            c => c,
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        if city.is_active {
            tx.execute("UPDATE cities SET is_active = 0", []).map_err(db)?;
        }
        let id = tx
            .prepare_cached(
                "INSERT INTO cities (name, country, center_lat, center_lon, is_downloaded, \
                 download_size, last_update, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, '', ?7)",
            )
            .map_err(db)?
            .insert(params![
                name,
                country,
                city.center_lat,
                city.center_lon,
                city.is_downloaded,
                city.download_size,
                city.is_active,
            ])
            .map_err(db)?;
        tx.commit().map_err(db)?;
        info!("Added city {} ({})", id, name);
        Ok(id)
    }

    /// Delete a city and its user bookkeeping. Places and tours of the
    /// city stay in place.
    pub fn delete_city(&self, city_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        tx.execute("DELETE FROM user_cities WHERE city_id = ?1", params![city_id])
            .map_err(db)?;
        let count = tx
            .execute("DELETE FROM cities WHERE id = ?1", params![city_id])
            .map_err(db)?;
        tx.commit().map_err(db)?;
        Ok(count > 0)
    }

    pub fn get_user_cities(&self, user_id: i64) -> Result<Vec<UserCity>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM user_cities WHERE user_id = ?1 ORDER BY city_id")
            .map_err(db)?;
        let rows = stmt
            .query_map(params![user_id], |row| Ok(Self::row_to_user_city(row)))
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Bump the user's visited-stop counter for a city.
    pub fn record_point_visited(&self, user_id: i64, city_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        bump_user_city_counter(&conn, user_id, city_id, "points_visited")
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    pub(crate) fn row_to_city(row: &rusqlite::Row<'_>) -> City {
        City {
            id: row.get("id").unwrap_or(0),
            name: row.get("name").unwrap_or_default(),
            country: row.get("country").ok().flatten(),
            center_lat: row.get("center_lat").ok().flatten(),
            center_lon: row.get("center_lon").ok().flatten(),
            is_downloaded: row.get::<_, Option<bool>>("is_downloaded").ok().flatten().unwrap_or(false),
            download_size: row.get("download_size").ok().flatten(),
            last_update: row.get("last_update").ok().flatten(),
            is_active: row.get::<_, Option<bool>>("is_active").ok().flatten().unwrap_or(false),
        }
    }

    fn row_to_user_city(row: &rusqlite::Row<'_>) -> UserCity {
        UserCity {
            user_id: row.get("user_id").unwrap_or(0),
            city_id: row.get("city_id").unwrap_or(0),
            downloaded_at: row.get("downloaded_at").ok().flatten(),
            is_current: row.get::<_, Option<bool>>("is_current").ok().flatten().unwrap_or(false),
            points_visited: row.get::<_, Option<i64>>("points_visited").ok().flatten().unwrap_or(0),
            tours_completed: row.get::<_, Option<i64>>("tours_completed").ok().flatten().unwrap_or(0),
        }
    }
}

pub(crate) fn active_city(conn: &Connection) -> Result<Option<City>> {
    conn.prepare_cached("SELECT * FROM cities WHERE is_active = 1 LIMIT 1")
        .map_err(db)?
        .query_row([], |row| Ok(SqliteStore::row_to_city(row)))
        .optional()
        .map_err(db)
}

/// Increment a `user_cities` counter, creating the row when absent.
pub(crate) fn bump_user_city_counter(
    conn: &Connection,
    user_id: i64,
    city_id: i64,
    column: &str,
) -> Result<()> {
    let updated = conn
        .execute(
            &format!(
                "UPDATE user_cities SET {col} = COALESCE({col}, 0) + 1 WHERE user_id = ?1 AND city_id = ?2",
                col = column
            ),
            params![user_id, city_id],
        )
        .map_err(db)?;
    if updated == 0 {
        conn.execute(
            &format!(
                "INSERT INTO user_cities (user_id, city_id, downloaded_at, is_current, {}) VALUES (?1, ?2, '', 0, 1)",
                column
            ),
            params![user_id, city_id],
        )
        .map_err(db)?;
    }
    Ok(())
}

/// Record that a user downloaded a city package.
pub(crate) fn mark_city_downloaded(conn: &Connection, city_id: i64, user_id: i64) -> Result<()> {
    let now = now_rfc3339();
    conn.execute(
        "UPDATE cities SET is_downloaded = 1, last_update = ?1 WHERE id = ?2",
        params![now, city_id],
    )
    .map_err(db)?;
    let updated = conn
        .execute(
            "UPDATE user_cities SET downloaded_at = ?1 WHERE user_id = ?2 AND city_id = ?3",
            params![now, user_id, city_id],
        )
        .map_err(db)?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO user_cities (user_id, city_id, downloaded_at, is_current) VALUES (?1, ?2, ?3, 0)",
            params![user_id, city_id, now],
        )
        .map_err(db)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_ids(store: &SqliteStore) -> Vec<i64> {
        store
            .list_cities()
            .unwrap()
            .into_iter()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect()
    }

    #[test]
    fn test_set_active_city_leaves_exactly_one() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_active_city(3, 1).unwrap();
        assert_eq!(active_ids(&store), vec![3]);
        assert_eq!(store.get_active_city().unwrap().unwrap().name, "Казань");

        let current: Vec<_> = store
            .get_user_cities(1)
            .unwrap()
            .into_iter()
            .filter(|c| c.is_current)
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].city_id, 3);
    }

    #[test]
    fn test_set_active_city_repairs_broken_state() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock();
            conn.execute("UPDATE cities SET is_active = 1", []).unwrap();
        }
        assert_eq!(active_ids(&store).len(), 6);

        store.set_active_city(2, 1).unwrap();
        assert_eq!(active_ids(&store), vec![2]);

        {
            let conn = store.conn.lock();
            conn.execute("UPDATE cities SET is_active = 0", []).unwrap();
        }
        assert!(store.get_active_city().unwrap().is_none());
        store.set_active_city(5, 1).unwrap();
        assert_eq!(active_ids(&store), vec![5]);
    }

    #[test]
    fn test_set_unknown_city_keeps_selection() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.set_active_city(999, 1).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(active_ids(&store), vec![1]);
    }

    #[test]
    fn test_add_and_delete_city() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .add_city(&NewCity {
                name: "  Псков ".into(),
                country: "".into(),
                center_lat: 57.81,
                center_lon: 28.33,
                ..Default::default()
            })
            .unwrap();

        let city = store.get_city(id).unwrap().unwrap();
        assert_eq!(city.name, "Псков");
        assert_eq!(city.country.as_deref(), Some("Россия"));
        assert!(!city.is_active);

        store.set_active_city(id, 1).unwrap();
        assert!(store.delete_city(id).unwrap());
        assert!(store.get_city(id).unwrap().is_none());
        assert!(store.get_user_cities(1).unwrap().iter().all(|c| c.city_id != id));
    }

    #[test]
    fn test_add_city_requires_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .add_city(&NewCity {
                name: "   ".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_point_visit_counter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.record_point_visited(4, 1).unwrap();
        store.record_point_visited(4, 1).unwrap();
        let rows = store.get_user_cities(4).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points_visited, 2);
        assert!(!rows[0].is_current);
    }
}
