//! Tours, their ordered stops and per-user progress rows.

use rusqlite::{named_params, params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::cities::{active_city, bump_user_city_counter};
use super::{db, decode_urls, encode_urls, SqliteStore};
use crate::types::{
    ProgressUpdate, Tour, TourPoint, TourPointRecord, TourRecord, TourUpdate, TourWithProgress,
    UserTourProgress,
};
use cityguide_core::{Error, Result};

const DRAFT_TITLE: &str = "Новая экскурсия";
const DRAFT_DESCRIPTION: &str = "Описание экскурсии";
const DRAFT_THEME: &str = "history";

impl SqliteStore {
    // ---------------------------------------------------------------
    // Tours
    // ---------------------------------------------------------------

    /// Create a draft tour for the admin editor. Returns its id.
    pub fn insert_tour_quick(&self, city_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO tours (city_id, title, description, theme, price, duration, distance, rating, is_linear) \
                 VALUES (?1, ?2, ?3, ?4, 0.0, 60, 2.0, NULL, 1)",
            )
            .map_err(db)?
            .insert(params![city_id, DRAFT_TITLE, DRAFT_DESCRIPTION, DRAFT_THEME])
            .map_err(db)?;
        debug!("Draft tour {} created in city {}", id, city_id);
        Ok(id)
    }

    pub fn update_tour_basic(&self, tour_id: i64, update: &TourUpdate) -> Result<bool> {
        let title = update.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("tour title is required".into()));
        }
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE tours SET title = ?1, description = ?2, theme = ?3, price = ?4, duration = ?5, \
                 distance = ?6, rating = ?7, cover_image = ?8 WHERE id = ?9",
                params![
                    title,
                    update.description,
                    update.theme,
                    update.price,
                    update.duration,
                    update.distance,
                    update.rating,
                    update.cover_image,
                    tour_id,
                ],
            )
            .map_err(db)?;
        Ok(count > 0)
    }

    /// Insert or replace a tour and replace its stops. Returns the tour id.
    pub fn insert_tour_with_points(&self, tour: &TourRecord) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        let id = insert_tour_with_points(&tx, tour)?;
        tx.commit().map_err(db)?;
        Ok(id)
    }

    pub fn get_tour(&self, tour_id: i64) -> Result<Option<Tour>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM tours WHERE id = ?1")
            .map_err(db)?
            .query_row(params![tour_id], |row| Ok(Self::row_to_tour(row)))
            .optional()
            .map_err(db)?;
        Ok(row)
    }

    /// Tours of the active city, or all tours when no city is active.
    pub fn get_all_tours(&self) -> Result<Vec<Tour>> {
        let conn = self.conn.lock();
        let city_id = active_city(&conn)?.map(|c| c.id);
        let mut stmt = conn
            .prepare_cached("SELECT * FROM tours WHERE ?1 IS NULL OR city_id = ?1 ORDER BY id")
            .map_err(db)?;
        let rows = stmt
            .query_map(params![city_id], |row| Ok(Self::row_to_tour(row)))
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Tours of the active city with the user's progress on each.
    pub fn get_all_tours_with_progress(&self, user_id: i64) -> Result<Vec<TourWithProgress>> {
        let conn = self.conn.lock();
        let city_id = active_city(&conn)?.map(|c| c.id);
        let mut stmt = conn
            .prepare_cached(
                "SELECT t.*, ut.progress AS ut_progress, ut.current_point AS ut_current_point, \
                 ut.completed_at AS ut_completed_at \
                 FROM tours t LEFT JOIN user_tours ut ON t.id = ut.tour_id AND ut.user_id = ?1 \
                 WHERE ?2 IS NULL OR t.city_id = ?2 ORDER BY t.id",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![user_id, city_id], |row| {
                Ok(TourWithProgress {
                    tour: Self::row_to_tour(row),
                    progress: row.get("ut_progress").ok().flatten(),
                    current_point: row.get("ut_current_point").ok().flatten(),
                    completed_at: row.get("ut_completed_at").ok().flatten(),
                })
            })
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_tours(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tours", [], |row| row.get(0))
            .map_err(db)?;
        Ok(count)
    }

    /// Delete a tour, its stops and all progress rows for it.
    pub fn delete_tour(&self, tour_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        tx.execute("DELETE FROM tour_points WHERE tour_id = ?1", params![tour_id])
            .map_err(db)?;
        tx.execute("DELETE FROM user_tours WHERE tour_id = ?1", params![tour_id])
            .map_err(db)?;
        let count = tx
            .execute("DELETE FROM tours WHERE id = ?1", params![tour_id])
            .map_err(db)?;
        tx.commit().map_err(db)?;
        if count > 0 {
            info!("Deleted tour {}", tour_id);
        }
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Tour stops
    // ---------------------------------------------------------------

    /// Stops of a tour ordered by `order_index`.
    pub fn get_points_for_tour(&self, tour_id: i64) -> Result<Vec<TourPoint>> {
        let conn = self.conn.lock();
        points_for_tour(&conn, tour_id)
    }

    /// Replace all stops of a tour. Stops are numbered 1..N in slice order.
    pub fn set_tour_points(&self, tour_id: i64, points: &[TourPointRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        replace_points(&tx, tour_id, points)?;
        tx.commit().map_err(db)?;
        debug!("Tour {} now has {} stops", tour_id, points.len());
        Ok(())
    }

    /// Remove the stop at `order_index` and close the gap.
    pub fn remove_tour_point(&self, tour_id: i64, order_index: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        let count = tx
            .execute(
                "DELETE FROM tour_points WHERE rowid = (SELECT rowid FROM tour_points \
                 WHERE tour_id = ?1 AND order_index = ?2 ORDER BY rowid LIMIT 1)",
                params![tour_id, order_index],
            )
            .map_err(db)?;
        renumber_points(&tx, tour_id)?;
        tx.commit().map_err(db)?;
        Ok(count > 0)
    }

    /// Move the stop at position `from` to position `to` (both 1-based).
    pub fn move_tour_point(&self, tour_id: i64, from: i64, to: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;

        let rowids = ordered_rowids(&tx, tour_id)?;
        let len = rowids.len() as i64;
        if !(1..=len).contains(&from) || !(1..=len).contains(&to) {
            return Err(Error::InvalidInput(format!(
                "stop position out of range: {} -> {} (tour has {})",
                from, to, len
            )));
        }

        let mut reordered = rowids;
        let moved = reordered.remove((from - 1) as usize);
        reordered.insert((to - 1) as usize, moved);
        write_order(&tx, &reordered)?;
        tx.commit().map_err(db)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Progress
    // ---------------------------------------------------------------

    pub fn get_user_tour_progress(&self, tour_id: i64, user_id: i64) -> Result<Option<UserTourProgress>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(
                "SELECT user_id, tour_id, progress, current_point, started_at, completed_at, rating_user \
                 FROM user_tours WHERE user_id = ?1 AND tour_id = ?2",
            )
            .map_err(db)?
            .query_row(params![user_id, tour_id], |row| {
                Ok(UserTourProgress {
                    user_id: row.get("user_id").unwrap_or(0),
                    tour_id: row.get("tour_id").unwrap_or(0),
                    progress: row.get::<_, Option<i64>>("progress").ok().flatten().unwrap_or(0),
                    current_point: row.get::<_, Option<i64>>("current_point").ok().flatten().unwrap_or(0),
                    started_at: row.get("started_at").ok().flatten(),
                    completed_at: row.get("completed_at").ok().flatten(),
                    rating_user: row.get("rating_user").ok().flatten(),
                })
            })
            .optional()
            .map_err(db)?;
        Ok(row)
    }

    /// Insert or update a progress row.
    ///
    /// On conflict `started_at` and `rating_user` keep their stored values
    /// when the update carries `None`; everything else is overwritten.
    pub fn upsert_user_tour_progress(&self, update: &ProgressUpdate) -> Result<()> {
        let conn = self.conn.lock();
        upsert_progress(&conn, update)
    }

    /// Bump the user's completed-tour counter for the tour's city.
    pub fn record_tour_completed(&self, user_id: i64, tour_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        bump_tours_completed(&conn, user_id, tour_id)
    }

    /// Store the final progress row and count the completion in one
    /// transaction. Either both land or neither does.
    pub fn complete_user_tour(&self, update: &ProgressUpdate) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        upsert_progress(&tx, update)?;
        bump_tours_completed(&tx, update.user_id, update.tour_id)?;
        tx.commit().map_err(db)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    pub(crate) fn row_to_tour(row: &rusqlite::Row<'_>) -> Tour {
        Tour {
            id: row.get("id").unwrap_or(0),
            title: row.get("title").unwrap_or_default(),
            description: row.get("description").ok().flatten(),
            theme: row.get("theme").ok().flatten(),
            duration: row.get("duration").ok().flatten(),
            distance: row.get("distance").ok().flatten(),
            cover_image: row.get("cover_image").ok().flatten(),
            audio_intro: row.get("audio_intro").ok().flatten(),
            is_linear: row.get::<_, Option<bool>>("is_linear").ok().flatten().unwrap_or(true),
            rating: row.get("rating").ok().flatten(),
            price: row.get("price").ok().flatten(),
            author_id: row.get("author_id").ok().flatten(),
            city_id: row.get::<_, Option<i64>>("city_id").ok().flatten().unwrap_or(1),
        }
    }
}

pub(crate) fn insert_tour_with_points(conn: &Connection, tour: &TourRecord) -> Result<i64> {
    let title = tour
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::InvalidInput("tour title is required".into()))?;

    conn.prepare_cached(
        "INSERT OR REPLACE INTO tours
            (id, title, description, theme, duration, distance, cover_image,
             audio_intro, is_linear, rating, price, author_id, city_id)
         VALUES
            (:id, :title, :description, :theme, :duration, :distance, :cover_image,
             :audio_intro, :is_linear, :rating, :price, :author_id, :city_id)",
    )
    .map_err(db)?
    .execute(named_params! {
        ":id": tour.id,
        ":title": title,
        ":description": tour.description,
        ":theme": tour.theme,
        ":duration": tour.duration,
        ":distance": tour.distance,
        ":cover_image": tour.cover_image,
        ":audio_intro": tour.audio_intro,
        ":is_linear": tour.is_linear.unwrap_or(true),
        ":rating": tour.rating,
        ":price": tour.price,
        ":author_id": tour.author_id,
        ":city_id": tour.city_id.unwrap_or(1),
    })
    .map_err(db)?;
    let tour_id = tour.id.unwrap_or_else(|| conn.last_insert_rowid());

    let mut points = tour.points.clone();
    points.sort_by_key(|p| p.order_index.unwrap_or(i64::MAX));
    replace_points(conn, tour_id, &points)?;
    Ok(tour_id)
}

fn upsert_progress(conn: &Connection, update: &ProgressUpdate) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO user_tours
            (user_id, tour_id, progress, current_point, started_at, completed_at, rating_user)
         VALUES (:user_id, :tour_id, :progress, :current_point, :started_at, :completed_at, :rating_user)
         ON CONFLICT(user_id, tour_id) DO UPDATE SET
            progress = excluded.progress,
            current_point = excluded.current_point,
            started_at = COALESCE(excluded.started_at, user_tours.started_at),
            completed_at = excluded.completed_at,
            rating_user = COALESCE(excluded.rating_user, user_tours.rating_user)",
    )
    .map_err(db)?
    .execute(named_params! {
        ":user_id": update.user_id,
        ":tour_id": update.tour_id,
        ":progress": update.progress,
        ":current_point": update.current_point,
        ":started_at": update.started_at,
        ":completed_at": update.completed_at,
        ":rating_user": update.rating_user,
    })
    .map_err(db)?;
    Ok(())
}

fn bump_tours_completed(conn: &Connection, user_id: i64, tour_id: i64) -> Result<()> {
    let city_id: Option<i64> = conn
        .query_row("SELECT city_id FROM tours WHERE id = ?1", params![tour_id], |row| row.get(0))
        .optional()
        .map_err(db)?
        .flatten();
    let city_id = city_id.ok_or_else(|| Error::NotFound(format!("tour {}", tour_id)))?;
    bump_user_city_counter(conn, user_id, city_id, "tours_completed")
}

pub(crate) fn points_for_tour(conn: &Connection, tour_id: i64) -> Result<Vec<TourPoint>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT tour_id, place_id, order_index, audio_story, quiz_question, image_urls \
             FROM tour_points WHERE tour_id = ?1 ORDER BY order_index, rowid",
        )
        .map_err(db)?;
    let rows = stmt
        .query_map(params![tour_id], |row| {
            Ok(TourPoint {
                tour_id: row.get("tour_id").unwrap_or(0),
                place_id: row.get("place_id").ok().flatten(),
                order_index: row.get::<_, Option<i64>>("order_index").ok().flatten().unwrap_or(0),
                audio_story: row.get::<_, Option<String>>("audio_story").ok().flatten().unwrap_or_default(),
                quiz_question: row
                    .get::<_, Option<String>>("quiz_question")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                image_urls: decode_urls(row.get("image_urls").ok().flatten()),
            })
        })
        .map_err(db)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn replace_points(conn: &Connection, tour_id: i64, points: &[TourPointRecord]) -> Result<()> {
    conn.execute("DELETE FROM tour_points WHERE tour_id = ?1", params![tour_id])
        .map_err(db)?;
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO tour_points (tour_id, place_id, order_index, audio_story, quiz_question, image_urls) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(db)?;
    for (i, point) in points.iter().enumerate() {
        stmt.execute(params![
            tour_id,
            point.place_id,
            i as i64 + 1,
            point.audio_story.as_deref().unwrap_or(""),
            point.quiz_question.as_deref().unwrap_or(""),
            encode_urls(&point.image_urls),
        ])
        .map_err(db)?;
    }
    Ok(())
}

fn ordered_rowids(conn: &Connection, tour_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare_cached("SELECT rowid FROM tour_points WHERE tour_id = ?1 ORDER BY order_index, rowid")
        .map_err(db)?;
    let rows = stmt.query_map(params![tour_id], |row| row.get(0)).map_err(db)?;
    rows.collect::<std::result::Result<Vec<i64>, _>>().map_err(db)
}

fn write_order(conn: &Connection, rowids: &[i64]) -> Result<()> {
    let mut stmt = conn
        .prepare_cached("UPDATE tour_points SET order_index = ?1 WHERE rowid = ?2")
        .map_err(db)?;
    for (i, rowid) in rowids.iter().enumerate() {
        stmt.execute(params![i as i64 + 1, rowid]).map_err(db)?;
    }
    Ok(())
}

/// Rewrite a tour's `order_index` values to 1..N keeping their relative order.
pub(crate) fn renumber_points(conn: &Connection, tour_id: i64) -> Result<()> {
    let rowids = ordered_rowids(conn, tour_id)?;
    write_order(conn, &rowids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaceRecord;

    fn store_with_places(n: i64) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in 1..=n {
            store
                .insert_place(&PlaceRecord {
                    id: Some(id),
                    name_ru: Some(format!("Место {}", id)),
                    ..Default::default()
                })
                .unwrap();
        }
        store
    }

    fn stop(place_id: i64) -> TourPointRecord {
        TourPointRecord {
            place_id: Some(place_id),
            ..Default::default()
        }
    }

    fn place_order(store: &SqliteStore, tour_id: i64) -> Vec<Option<i64>> {
        store
            .get_points_for_tour(tour_id)
            .unwrap()
            .into_iter()
            .map(|p| p.place_id)
            .collect()
    }

    fn indices(store: &SqliteStore, tour_id: i64) -> Vec<i64> {
        store
            .get_points_for_tour(tour_id)
            .unwrap()
            .into_iter()
            .map(|p| p.order_index)
            .collect()
    }

    #[test]
    fn test_quick_tour_and_basic_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_tour_quick(1).unwrap();

        let draft = store.get_tour(id).unwrap().unwrap();
        assert_eq!(draft.title, "Новая экскурсия");
        assert_eq!(draft.duration, Some(60));
        assert_eq!(draft.price, Some(0.0));

        store
            .update_tour_basic(
                id,
                &TourUpdate {
                    title: "Старая Москва".into(),
                    theme: Some("art".into()),
                    distance: Some(3.5),
                    ..Default::default()
                },
            )
            .unwrap();
        let tour = store.get_tour(id).unwrap().unwrap();
        assert_eq!(tour.title, "Старая Москва");
        assert_eq!(tour.theme.as_deref(), Some("art"));
        assert_eq!(tour.duration, None);

        assert!(store
            .update_tour_basic(id, &TourUpdate { title: " ".into(), ..Default::default() })
            .is_err());
    }

    #[test]
    fn test_insert_with_points_sorts_and_numbers() {
        let store = store_with_places(3);
        let id = store
            .insert_tour_with_points(&TourRecord {
                id: Some(40),
                title: Some("Центр".into()),
                points: vec![
                    TourPointRecord { order_index: Some(3), ..stop(3) },
                    TourPointRecord { order_index: Some(1), ..stop(1) },
                    TourPointRecord {
                        place_id: None,
                        order_index: Some(2),
                        audio_story: Some("Легенда о башне".into()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(id, 40);
        assert_eq!(place_order(&store, 40), vec![Some(1), None, Some(3)]);
        assert_eq!(indices(&store, 40), vec![1, 2, 3]);
        assert!(store.get_tour(40).unwrap().unwrap().is_linear);

        // re-inserting replaces the stops rather than appending
        store
            .insert_tour_with_points(&TourRecord {
                id: Some(40),
                title: Some("Центр".into()),
                points: vec![stop(2)],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(place_order(&store, 40), vec![Some(2)]);
    }

    #[test]
    fn test_remove_point_renumbers() {
        let store = store_with_places(4);
        let id = store.insert_tour_quick(1).unwrap();
        store
            .set_tour_points(id, &[stop(1), stop(2), stop(3), stop(4)])
            .unwrap();

        assert!(store.remove_tour_point(id, 2).unwrap());
        assert_eq!(place_order(&store, id), vec![Some(1), Some(3), Some(4)]);
        assert_eq!(indices(&store, id), vec![1, 2, 3]);

        assert!(!store.remove_tour_point(id, 9).unwrap());
        assert_eq!(indices(&store, id), vec![1, 2, 3]);
    }

    #[test]
    fn test_move_point() {
        let store = store_with_places(4);
        let id = store.insert_tour_quick(1).unwrap();
        store
            .set_tour_points(id, &[stop(1), stop(2), stop(3), stop(4)])
            .unwrap();

        store.move_tour_point(id, 4, 1).unwrap();
        assert_eq!(place_order(&store, id), vec![Some(4), Some(1), Some(2), Some(3)]);
        store.move_tour_point(id, 1, 3).unwrap();
        assert_eq!(place_order(&store, id), vec![Some(1), Some(2), Some(4), Some(3)]);
        assert_eq!(indices(&store, id), vec![1, 2, 3, 4]);

        assert!(store.move_tour_point(id, 0, 1).is_err());
        assert!(store.move_tour_point(id, 1, 5).is_err());
    }

    #[test]
    fn test_point_images_are_kept_per_stop() {
        let store = store_with_places(1);
        let id = store.insert_tour_quick(1).unwrap();
        store
            .set_tour_points(
                id,
                &[TourPointRecord {
                    image_urls: vec!["stop.jpg".into()],
                    quiz_question: Some("Сколько башен?".into()),
                    ..stop(1)
                }],
            )
            .unwrap();
        let points = store.get_points_for_tour(id).unwrap();
        assert_eq!(points[0].image_urls, vec!["stop.jpg".to_string()]);
        assert_eq!(points[0].quiz_question, "Сколько башен?");
        assert_eq!(points[0].audio_story, "");
    }

    #[test]
    fn test_delete_tour_cascades() {
        let store = store_with_places(2);
        let id = store.insert_tour_quick(1).unwrap();
        store.set_tour_points(id, &[stop(1), stop(2)]).unwrap();
        store
            .upsert_user_tour_progress(&ProgressUpdate {
                user_id: 1,
                tour_id: id,
                progress: 1,
                ..Default::default()
            })
            .unwrap();

        assert!(store.delete_tour(id).unwrap());
        assert!(store.get_tour(id).unwrap().is_none());
        assert!(store.get_points_for_tour(id).unwrap().is_empty());
        assert!(store.get_user_tour_progress(id, 1).unwrap().is_none());
        assert_eq!(store.count_places().unwrap(), 2);
    }

    #[test]
    fn test_progress_upsert_coalesces() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_tour_quick(1).unwrap();

        store
            .upsert_user_tour_progress(&ProgressUpdate {
                user_id: 1,
                tour_id: id,
                progress: 1,
                current_point: 0,
                started_at: Some("2024-06-01T10:00:00Z".into()),
                rating_user: Some(5),
                ..Default::default()
            })
            .unwrap();
        store
            .upsert_user_tour_progress(&ProgressUpdate {
                user_id: 1,
                tour_id: id,
                progress: 2,
                current_point: 1,
                started_at: None,
                completed_at: Some("2024-06-01T11:00:00Z".into()),
                rating_user: None,
            })
            .unwrap();

        let row = store.get_user_tour_progress(id, 1).unwrap().unwrap();
        assert_eq!(row.progress, 2);
        assert_eq!(row.current_point, 1);
        assert_eq!(row.started_at.as_deref(), Some("2024-06-01T10:00:00Z"));
        assert_eq!(row.completed_at.as_deref(), Some("2024-06-01T11:00:00Z"));
        assert_eq!(row.rating_user, Some(5));
    }

    #[test]
    fn test_tours_with_progress_for_active_city() {
        let store = SqliteStore::open_in_memory().unwrap();
        let moscow = store.insert_tour_quick(1).unwrap();
        let other = store.insert_tour_quick(1).unwrap();
        let spb = store.insert_tour_quick(2).unwrap();
        store
            .upsert_user_tour_progress(&ProgressUpdate {
                user_id: 7,
                tour_id: moscow,
                progress: 3,
                current_point: 2,
                ..Default::default()
            })
            .unwrap();

        let list = store.get_all_tours_with_progress(7).unwrap();
        assert_eq!(list.len(), 2);
        let first = list.iter().find(|t| t.tour.id == moscow).unwrap();
        assert_eq!(first.progress, Some(3));
        let second = list.iter().find(|t| t.tour.id == other).unwrap();
        assert_eq!(second.progress, None);

        // another user sees no progress
        assert!(store
            .get_all_tours_with_progress(8)
            .unwrap()
            .iter()
            .all(|t| t.progress.is_none()));

        store.set_active_city(2, 7).unwrap();
        let ids: Vec<_> = store.get_all_tours().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![spb]);
        assert_eq!(store.count_tours().unwrap(), 3);
    }

    #[test]
    fn test_tour_completion_counter() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_tour_quick(3).unwrap();
        store.record_tour_completed(1, id).unwrap();

        let rows = store.get_user_cities(1).unwrap();
        let kazan = rows.iter().find(|c| c.city_id == 3).unwrap();
        assert_eq!(kazan.tours_completed, 1);
        assert!(store.record_tour_completed(1, 999).is_err());
    }

    #[test]
    fn test_complete_user_tour_is_atomic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_tour_quick(1).unwrap();
        let finished = ProgressUpdate {
            user_id: 1,
            tour_id: id,
            progress: 1,
            completed_at: Some("2024-05-01T12:00:00+00:00".into()),
            ..Default::default()
        };

        // No city to count against: the progress row must not land either.
        store
            .conn
            .lock()
            .execute("UPDATE tours SET city_id = NULL WHERE id = ?1", params![id])
            .unwrap();
        assert!(matches!(store.complete_user_tour(&finished), Err(Error::NotFound(_))));
        assert!(store.get_user_tour_progress(id, 1).unwrap().is_none());

        store
            .conn
            .lock()
            .execute("UPDATE tours SET city_id = 1 WHERE id = ?1", params![id])
            .unwrap();
        store.complete_user_tour(&finished).unwrap();
        let row = store.get_user_tour_progress(id, 1).unwrap().unwrap();
        assert_eq!(row.completed_at.as_deref(), Some("2024-05-01T12:00:00+00:00"));
        let moscow = store.get_user_cities(1).unwrap().into_iter().find(|c| c.city_id == 1).unwrap();
        assert_eq!(moscow.tours_completed, 1);
    }
}
