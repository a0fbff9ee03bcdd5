//! Fixture loading from bundled JSON files.
//!
//! `places.json` and `tours.json` hold the default city's data; per-city
//! packages are `places_<city_id>.json` and `tours_<city_id>.json`. Each file
//! is a JSON array of [`PlaceRecord`] / [`TourRecord`] objects.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::sqlite::{db, SqliteStore};
use crate::sqlite::{insert_place, insert_tour_with_points, mark_city_downloaded, renumber_points};
use crate::types::{PlaceRecord, TourRecord};
use cityguide_core::{Error, Result};

pub const DEFAULT_PLACES_FILE: &str = "places.json";
pub const DEFAULT_TOURS_FILE: &str = "tours.json";

pub fn city_places_file(dir: &Path, city_id: i64) -> PathBuf {
    dir.join(format!("places_{}.json", city_id))
}

pub fn city_tours_file(dir: &Path, city_id: i64) -> PathBuf {
    dir.join(format!("tours_{}.json", city_id))
}

/// Read a fixture array. A missing file is `Ok(None)`.
///
/// A file that is not a JSON array is `Error::Fixture`. Elements that do
/// not fit `T` are skipped with a warning so one bad record does not drop
/// the rest of the file.
pub fn read_fixture<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let values: Vec<serde_json::Value> = serde_json::from_str(&data)
        .map_err(|e| Error::Fixture(format!("{}: {}", path.display(), e)))?;

    let mut records = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping record {} in {}: {}", i, path.display(), e),
        }
    }
    Ok(Some(records))
}

/// Custom stops have no place and always pass.
fn place_exists(conn: &Connection, place_id: Option<i64>) -> Result<bool> {
    let Some(id) = place_id else {
        return Ok(true);
    };
    conn.prepare_cached("SELECT 1 FROM places WHERE id = ?1")
        .map_err(db)?
        .exists([id])
        .map_err(db)
}

/// Counts of records written by a fixture load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureReport {
    pub places: usize,
    pub tours: usize,
}

impl SqliteStore {
    /// Populate empty `places` / `tours` tables from the default fixtures.
    ///
    /// Tables that already hold rows are left alone.
    pub fn load_default_fixtures(&self, dir: impl AsRef<Path>) -> Result<FixtureReport> {
        let dir = dir.as_ref();
        let mut report = FixtureReport::default();

        if self.count_places()? == 0 {
            if let Some(places) = read_fixture::<PlaceRecord>(&dir.join(DEFAULT_PLACES_FILE))? {
                report.places = self.write_places(places, None)?;
            }
        }
        if self.count_tours()? == 0 {
            if let Some(tours) = read_fixture::<TourRecord>(&dir.join(DEFAULT_TOURS_FILE))? {
                report.tours = self.write_tours(tours, None)?;
            }
        }

        if report.places + report.tours > 0 {
            info!(
                "Loaded default fixtures: {} places, {} tours from {}",
                report.places,
                report.tours,
                dir.display()
            );
        }
        Ok(report)
    }

    /// Delete every place and reload `places.json`.
    pub fn reload_places_from_fixtures(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let places = read_fixture::<PlaceRecord>(&dir.as_ref().join(DEFAULT_PLACES_FILE))?
            .unwrap_or_default();

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        // references are checked at commit, after the reload and cleanup
        tx.execute_batch("PRAGMA defer_foreign_keys = ON; DELETE FROM places;")
            .map_err(db)?;
        let mut written = 0;
        for mut place in places {
            place.city_id.get_or_insert(1);
            match insert_place(&tx, &place) {
                Ok(_) => written += 1,
                Err(Error::InvalidInput(msg)) => warn!("Skipping place fixture {:?}: {}", place.id, msg),
                Err(e) => return Err(e),
            }
        }

        let affected_tours: Vec<i64> = {
            let mut stmt = tx
                .prepare(
                    "SELECT DISTINCT tour_id FROM tour_points \
                     WHERE place_id IS NOT NULL AND place_id NOT IN (SELECT id FROM places)",
                )
                .map_err(db)?;
            let rows = stmt.query_map([], |row| row.get(0)).map_err(db)?;
            rows.collect::<std::result::Result<_, _>>().map_err(db)?
        };
        tx.execute_batch(
            "DELETE FROM tour_points WHERE place_id IS NOT NULL AND place_id NOT IN (SELECT id FROM places);
             DELETE FROM favorites WHERE place_id NOT IN (SELECT id FROM places);
             DELETE FROM reviews WHERE place_id NOT IN (SELECT id FROM places);",
        )
        .map_err(db)?;
        for tour_id in &affected_tours {
            renumber_points(&tx, *tour_id)?;
        }
        tx.commit().map_err(db)?;
        info!(
            "Reloaded {} places ({} tours lost stops)",
            written,
            affected_tours.len()
        );
        Ok(written)
    }

    /// Install a city package and mark the city downloaded for the user.
    ///
    /// Records are forced into `city_id`; missing package files are skipped.
    pub fn download_city_data(&self, city_id: i64, user_id: i64, dir: impl AsRef<Path>) -> Result<FixtureReport> {
        let dir = dir.as_ref();
        if self.get_city(city_id)?.is_none() {
            return Err(Error::NotFound(format!("city {}", city_id)));
        }

        let places = read_fixture::<PlaceRecord>(&city_places_file(dir, city_id))?.unwrap_or_default();
        let tours = read_fixture::<TourRecord>(&city_tours_file(dir, city_id))?.unwrap_or_default();

        let report = FixtureReport {
            places: self.write_places(places, Some(city_id))?,
            tours: self.write_tours(tours, Some(city_id))?,
        };

        let conn = self.conn.lock();
        mark_city_downloaded(&conn, city_id, user_id)?;
        info!(
            "City {} downloaded: {} places, {} tours",
            city_id, report.places, report.tours
        );
        Ok(report)
    }

    fn write_places(&self, places: Vec<PlaceRecord>, city_id: Option<i64>) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        let mut written = 0;
        for mut place in places {
            place.city_id = city_id.or(place.city_id).or(Some(1));
            match insert_place(&tx, &place) {
                Ok(_) => written += 1,
                Err(Error::InvalidInput(msg)) => warn!("Skipping place fixture {:?}: {}", place.id, msg),
                Err(e) => return Err(e),
            }
        }
        tx.commit().map_err(db)?;
        Ok(written)
    }

    fn write_tours(&self, tours: Vec<TourRecord>, city_id: Option<i64>) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        let mut written = 0;
        for mut tour in tours {
            tour.city_id = city_id.or(tour.city_id).or(Some(1));
            let before = tour.points.len();
            let mut kept = Vec::with_capacity(before);
            for point in tour.points.drain(..) {
                if place_exists(&tx, point.place_id)? {
                    kept.push(point);
                }
            }
            if kept.len() < before {
                warn!(
                    "Tour fixture {:?}: dropped {} stops with unknown places",
                    tour.id,
                    before - kept.len()
                );
            }
            tour.points = kept;
            match insert_tour_with_points(&tx, &tour) {
                Ok(_) => written += 1,
                Err(Error::InvalidInput(msg)) => warn!("Skipping tour fixture {:?}: {}", tour.id, msg),
                Err(e) => return Err(e),
            }
        }
        tx.commit().map_err(db)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    fn fixture_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_json(
            dir.path(),
            DEFAULT_PLACES_FILE,
            json!([
                {"id": 1, "name_ru": "Красная площадь", "name_en": "Red Square", "category": "sight",
                 "lat": 55.7539, "lon": 37.6208, "image_urls": ["red.jpg"]},
                {"id": 2, "name": "Третьяковская галерея", "category": "museum", "rating": 4.8},
                {"id": 3, "category": "food"}
            ]),
        );
        write_json(
            dir.path(),
            DEFAULT_TOURS_FILE,
            json!([
                {"id": 1, "title": "Сердце Москвы", "theme": "history", "duration": 90,
                 "points": [
                    {"place_id": 2, "order_index": 2, "audio_story": "Галерея"},
                    {"place_id": 1, "order_index": 1, "quiz_question": "Какого цвета стены?"}
                 ]}
            ]),
        );
        dir
    }

    #[test]
    fn test_load_default_fixtures_once() {
        let dir = fixture_dir();
        let store = SqliteStore::open_in_memory().unwrap();

        let report = store.load_default_fixtures(dir.path()).unwrap();
        assert_eq!(report, FixtureReport { places: 2, tours: 1 });

        let square = store.get_place(1).unwrap().unwrap();
        assert_eq!(square.name, "Красная площадь");
        assert_eq!(square.name_en.as_deref(), Some("Red Square"));
        assert_eq!(square.image_urls, vec!["red.jpg".to_string()]);
        assert_eq!(square.city_id, 1);

        let points = store.get_points_for_tour(1).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].place_id, Some(1));
        assert_eq!(points[0].quiz_question, "Какого цвета стены?");

        // tables are no longer empty, so nothing is reloaded
        let again = store.load_default_fixtures(dir.path()).unwrap();
        assert_eq!(again, FixtureReport::default());
        assert_eq!(store.count_places().unwrap(), 2);
    }

    #[test]
    fn test_tour_stops_with_unknown_places_are_dropped() {
        let dir = TempDir::new().unwrap();
        write_json(dir.path(), DEFAULT_PLACES_FILE, json!([{"id": 1, "name": "Арбат"}]));
        write_json(
            dir.path(),
            DEFAULT_TOURS_FILE,
            json!([{"id": 3, "title": "Арбат", "is_linear": 0, "points": [
                {"place_id": 1}, {"place_id": 77}, {"place_id": null, "audio_story": "Переулки"}
            ]}]),
        );
        let store = SqliteStore::open_in_memory().unwrap();
        store.load_default_fixtures(dir.path()).unwrap();

        let points = store.get_points_for_tour(3).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].place_id, None);
        assert_eq!(points[1].order_index, 2);
        assert!(!store.get_tour(3).unwrap().unwrap().is_linear);
    }

    #[test]
    fn test_missing_fixture_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.load_default_fixtures(dir.path()).unwrap(), FixtureReport::default());
    }

    #[test]
    fn test_malformed_fixture_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_PLACES_FILE), "{\"id\": 1}").unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load_default_fixtures(dir.path()).unwrap_err(),
            Error::Fixture(_)
        ));
    }

    #[test]
    fn test_mistyped_records_do_not_abort_the_file() {
        let dir = TempDir::new().unwrap();
        write_json(
            dir.path(),
            DEFAULT_PLACES_FILE,
            json!([
                {"id": 1, "name": "Зарядье", "price": 500, "phone": 74951234567i64, "image_urls": null},
                {"id": 2, "name": "ГУМ", "lat": "north"},
                {"id": 3, "name": "Манеж", "hours": "10-22"}
            ]),
        );
        let store = SqliteStore::open_in_memory().unwrap();

        let report = store.load_default_fixtures(dir.path()).unwrap();
        assert_eq!(report.places, 2);

        let park = store.get_place(1).unwrap().unwrap();
        assert_eq!(park.price.as_deref(), Some("500"));
        assert_eq!(park.phone.as_deref(), Some("74951234567"));
        assert!(park.image_urls.is_empty());
        assert!(store.get_place(2).unwrap().is_none());
        assert_eq!(store.get_place(3).unwrap().unwrap().hours.as_deref(), Some("10-22"));
    }

    #[test]
    fn test_download_city_forces_city_id() {
        let dir = TempDir::new().unwrap();
        write_json(
            dir.path(),
            "places_2.json",
            json!([{"id": 200, "name_ru": "Эрмитаж", "city_id": 1}]),
        );
        write_json(
            dir.path(),
            "tours_2.json",
            json!([{"id": 20, "title": "Белые ночи", "points": [{"place_id": 200}]}]),
        );
        let store = SqliteStore::open_in_memory().unwrap();

        let report = store.download_city_data(2, 1, dir.path()).unwrap();
        assert_eq!(report, FixtureReport { places: 1, tours: 1 });
        assert_eq!(store.get_place(200).unwrap().unwrap().city_id, 2);
        assert_eq!(store.get_tour(20).unwrap().unwrap().city_id, 2);

        let city = store.get_city(2).unwrap().unwrap();
        assert!(city.is_downloaded);
        assert!(city.last_update.map(|s| !s.is_empty()).unwrap_or(false));
        assert!(store
            .get_user_cities(1)
            .unwrap()
            .iter()
            .any(|c| c.city_id == 2 && c.downloaded_at.is_some()));

        assert!(matches!(
            store.download_city_data(42, 1, dir.path()).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_reload_places_replaces_table() {
        let dir = fixture_dir();
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_place(&PlaceRecord {
                id: Some(99),
                name: Some("Временное".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.reload_places_from_fixtures(dir.path()).unwrap(), 2);
        assert!(store.get_place(99).unwrap().is_none());
        assert!(store.get_place(2).unwrap().is_some());
    }

    #[test]
    fn test_reload_places_drops_dangling_references() {
        let dir = fixture_dir();
        let store = SqliteStore::open_in_memory().unwrap();
        store.load_default_fixtures(dir.path()).unwrap();
        store
            .insert_place(&PlaceRecord {
                id: Some(50),
                name: Some("Снесённый павильон".into()),
                ..Default::default()
            })
            .unwrap();
        store.add_favorite(50, 1).unwrap();
        store.add_favorite(1, 1).unwrap();

        let mut points = vec![
            crate::types::TourPointRecord { place_id: Some(50), ..Default::default() },
        ];
        points.extend(store.get_points_for_tour(1).unwrap().into_iter().map(|p| {
            crate::types::TourPointRecord { place_id: p.place_id, ..Default::default() }
        }));
        store.set_tour_points(1, &points).unwrap();
        assert_eq!(store.get_points_for_tour(1).unwrap().len(), 3);

        store.reload_places_from_fixtures(dir.path()).unwrap();

        let points = store.get_points_for_tour(1).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points.iter().map(|p| p.order_index).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!store.is_favorite(50, 1).unwrap());
        assert!(store.is_favorite(1, 1).unwrap());
    }
}
