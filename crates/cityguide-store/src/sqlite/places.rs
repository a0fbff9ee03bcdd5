//! Places, favorites and reviews.

use rusqlite::{named_params, params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::cities::active_city;
use super::tours::renumber_points;
use super::{db, decode_urls, encode_urls, now_rfc3339, SqliteStore};
use crate::types::{Place, PlaceRecord, Review};
use cityguide_core::{Error, Result};

/// First non-empty value.
fn pick(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl SqliteStore {
    // ---------------------------------------------------------------
    // Places
    // ---------------------------------------------------------------

    /// Insert or replace a place keyed by id. Returns the place id.
    ///
    /// Localized fields fall back to Russian: `name` is taken from `name`,
    /// then `name_ru`, then `name_en`; `name_ru` from `name_ru`, then `name`.
    pub fn insert_place(&self, place: &PlaceRecord) -> Result<i64> {
        let conn = self.conn.lock();
        insert_place(&conn, place)
    }

    pub fn get_place(&self, place_id: i64) -> Result<Option<Place>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM places WHERE id = ?1")
            .map_err(db)?
            .query_row(params![place_id], |row| Ok(Self::row_to_place(row)))
            .optional()
            .map_err(db)?;
        Ok(row)
    }

    /// Places of the active city, or all places when no city is active.
    pub fn get_all_places(&self) -> Result<Vec<Place>> {
        let conn = self.conn.lock();
        let city_id = active_city(&conn)?.map(|c| c.id);
        let mut stmt = conn
            .prepare_cached("SELECT * FROM places WHERE ?1 IS NULL OR city_id = ?1 ORDER BY id")
            .map_err(db)?;
        let rows = stmt
            .query_map(params![city_id], |row| Ok(Self::row_to_place(row)))
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Places of the active city in one category.
    pub fn get_places_by_category(&self, category: &str) -> Result<Vec<Place>> {
        Ok(self
            .get_all_places()?
            .into_iter()
            .filter(|p| p.category.as_deref() == Some(category))
            .collect())
    }

    pub fn count_places(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM places", [], |row| row.get(0))
            .map_err(db)?;
        Ok(count)
    }

    /// Admin edit of the main texts. Writes the base and Russian columns.
    pub fn update_place_basic(
        &self,
        place_id: i64,
        name: &str,
        short_desc: &str,
        description: &str,
        address: &str,
    ) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("place name is required".into()));
        }
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE places SET name = ?1, name_ru = ?1, short_desc = ?2, short_desc_ru = ?2, \
                 description = ?3, description_ru = ?3, address = ?4 WHERE id = ?5",
                params![name, short_desc, description, address, place_id],
            )
            .map_err(db)?;
        Ok(count > 0)
    }

    pub fn update_place_images(&self, place_id: i64, image_urls: &[String]) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE places SET image_urls = ?1 WHERE id = ?2",
                params![encode_urls(image_urls), place_id],
            )
            .map_err(db)?;
        Ok(count > 0)
    }

    pub fn update_place_coords(&self, place_id: i64, lat: f64, lon: f64) -> Result<bool> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidInput(format!("coordinates out of range: {}, {}", lat, lon)));
        }
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE places SET lat = ?1, lon = ?2 WHERE id = ?3",
                params![lat, lon, place_id],
            )
            .map_err(db)?;
        Ok(count > 0)
    }

    /// Delete a place together with its tour stops, favorites and reviews.
    ///
    /// Tours that lost a stop are renumbered so their stops stay 1..N.
    pub fn delete_place(&self, place_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;

        let affected_tours: Vec<i64> = {
            let mut stmt = tx
                .prepare("SELECT DISTINCT tour_id FROM tour_points WHERE place_id = ?1")
                .map_err(db)?;
            let rows = stmt
                .query_map(params![place_id], |row| row.get(0))
                .map_err(db)?;
            rows.collect::<std::result::Result<_, _>>().map_err(db)?
        };

        tx.execute("DELETE FROM tour_points WHERE place_id = ?1", params![place_id])
            .map_err(db)?;
        tx.execute("DELETE FROM favorites WHERE place_id = ?1", params![place_id])
            .map_err(db)?;
        tx.execute("DELETE FROM reviews WHERE place_id = ?1", params![place_id])
            .map_err(db)?;
        let count = tx
            .execute("DELETE FROM places WHERE id = ?1", params![place_id])
            .map_err(db)?;
        for tour_id in &affected_tours {
            renumber_points(&tx, *tour_id)?;
        }
        tx.commit().map_err(db)?;

        if count > 0 {
            info!(
                "Deleted place {} ({} tours renumbered)",
                place_id,
                affected_tours.len()
            );
        }
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Favorites
    // ---------------------------------------------------------------

    /// Mark a place as favorite. Adding an existing favorite is a no-op.
    pub fn add_favorite(&self, place_id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO favorites (user_id, place_id) SELECT ?1, ?2 \
             WHERE NOT EXISTS (SELECT 1 FROM favorites WHERE user_id = ?1 AND place_id = ?2)",
            params![user_id, place_id],
        )
        .map_err(db)?;
        Ok(())
    }

    pub fn remove_favorite(&self, place_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND place_id = ?2",
                params![user_id, place_id],
            )
            .map_err(db)?;
        Ok(count > 0)
    }

    pub fn is_favorite(&self, place_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .prepare_cached("SELECT 1 FROM favorites WHERE user_id = ?1 AND place_id = ?2")
            .map_err(db)?
            .exists(params![user_id, place_id])
            .map_err(db)?;
        Ok(found)
    }

    pub fn get_favorite_places(&self, user_id: i64) -> Result<Vec<Place>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT DISTINCT p.* FROM places p JOIN favorites f ON p.id = f.place_id \
                 WHERE f.user_id = ?1 ORDER BY p.id",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![user_id], |row| Ok(Self::row_to_place(row)))
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ---------------------------------------------------------------
    // Reviews
    // ---------------------------------------------------------------

    /// Add a review. Ratings are 1 to 5; an empty `created_at` means now.
    pub fn add_review(
        &self,
        place_id: i64,
        rating: i64,
        comment: &str,
        user_id: Option<i64>,
        created_at: Option<&str>,
    ) -> Result<i64> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidInput(format!("rating must be 1..5, got {}", rating)));
        }
        let created_at = created_at
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(now_rfc3339);

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO reviews (place_id, user_id, rating, comment, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(db)?
            .insert(params![place_id, user_id, rating, comment.trim(), created_at])
            .map_err(db)?;
        debug!("Review {} added for place {}", id, place_id);
        Ok(id)
    }

    /// Reviews of a place, newest first.
    pub fn get_reviews_for_place(&self, place_id: i64) -> Result<Vec<Review>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, place_id, user_id, rating, comment, created_at FROM reviews \
                 WHERE place_id = ?1 ORDER BY id DESC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![place_id], |row| {
                Ok(Review {
                    id: row.get("id").unwrap_or(0),
                    place_id: row.get("place_id").unwrap_or(0),
                    user_id: row.get("user_id").ok().flatten(),
                    rating: row.get::<_, Option<i64>>("rating").ok().flatten().unwrap_or(0),
                    comment: row.get::<_, Option<String>>("comment").ok().flatten().unwrap_or_default(),
                    created_at: row
                        .get::<_, Option<String>>("created_at")
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                })
            })
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Mean review rating, `None` without reviews.
    pub fn average_rating_for_place(&self, place_id: i64) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        let avg: Option<f64> = conn
            .query_row(
                "SELECT AVG(rating) FROM reviews WHERE place_id = ?1",
                params![place_id],
                |row| row.get(0),
            )
            .map_err(db)?;
        Ok(avg)
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    pub(crate) fn row_to_place(row: &rusqlite::Row<'_>) -> Place {
        Place {
            id: row.get("id").unwrap_or(0),
            name: row.get("name").unwrap_or_default(),
            name_ru: row.get("name_ru").ok().flatten(),
            name_en: row.get("name_en").ok().flatten(),
            category: row.get("category").ok().flatten(),
            description: row.get("description").ok().flatten(),
            description_ru: row.get("description_ru").ok().flatten(),
            description_en: row.get("description_en").ok().flatten(),
            short_desc: row.get("short_desc").ok().flatten(),
            short_desc_ru: row.get("short_desc_ru").ok().flatten(),
            short_desc_en: row.get("short_desc_en").ok().flatten(),
            lat: row.get("lat").ok().flatten(),
            lon: row.get("lon").ok().flatten(),
            address: row.get("address").ok().flatten(),
            phone: row.get("phone").ok().flatten(),
            website: row.get("website").ok().flatten(),
            price: row.get("price").ok().flatten(),
            hours: row.get("hours").ok().flatten(),
            rating: row.get("rating").ok().flatten(),
            image_urls: decode_urls(row.get("image_urls").ok().flatten()),
            city_id: row.get::<_, Option<i64>>("city_id").ok().flatten().unwrap_or(1),
        }
    }
}

pub(crate) fn insert_place(conn: &Connection, place: &PlaceRecord) -> Result<i64> {
    let name = pick(&[&place.name, &place.name_ru, &place.name_en])
        .ok_or_else(|| Error::InvalidInput("place name is required".into()))?;

    conn.prepare_cached(
        "INSERT OR REPLACE INTO places
            (id, name, name_ru, name_en, category,
             description, description_ru, description_en,
             short_desc, short_desc_ru, short_desc_en,
             lat, lon, address, phone, website, price, hours, rating, image_urls, city_id)
         VALUES
            (:id, :name, :name_ru, :name_en, :category,
             :description, :description_ru, :description_en,
             :short_desc, :short_desc_ru, :short_desc_en,
             :lat, :lon, :address, :phone, :website, :price, :hours, :rating, :image_urls, :city_id)",
    )
    .map_err(db)?
    .execute(named_params! {
        ":id": place.id,
        ":name": name,
        ":name_ru": pick(&[&place.name_ru, &place.name]),
        ":name_en": place.name_en,
        ":category": place.category,
        ":description": pick(&[&place.description, &place.description_ru]),
        ":description_ru": pick(&[&place.description_ru, &place.description]),
        ":description_en": place.description_en,
        ":short_desc": pick(&[&place.short_desc, &place.short_desc_ru]),
        ":short_desc_ru": pick(&[&place.short_desc_ru, &place.short_desc]),
        ":short_desc_en": place.short_desc_en,
        ":lat": place.lat,
        ":lon": place.lon,
        ":address": place.address,
        ":phone": place.phone,
        ":website": place.website,
        ":price": place.price,
        ":hours": place.hours,
        ":rating": place.rating,
        ":image_urls": encode_urls(&place.image_urls),
        ":city_id": place.city_id.unwrap_or(1),
    })
    .map_err(db)?;

    Ok(place.id.unwrap_or_else(|| conn.last_insert_rowid()))
}
