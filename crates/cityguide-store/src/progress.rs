//! Walking one user through one tour.
//!
//! A [`TourRun`] holds the tour's stops and the user's position, and writes
//! every transition through to the `user_tours` row. The stored `progress`
//! never decreases while a run is in progress.

use tracing::{debug, info};

use crate::sqlite::{now_rfc3339, SqliteStore};
use crate::types::{ProgressUpdate, TourPoint, UserTourProgress};
use cityguide_core::{Error, Result};

/// Where a user stands in a tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourState {
    NotStarted,
    /// Zero-based index of the current stop.
    InProgress { index: usize },
    Completed,
}

/// Derive the state from a stored progress row and the tour's stop count.
pub fn state_of(row: Option<&UserTourProgress>, total: usize) -> TourState {
    match row {
        None => TourState::NotStarted,
        Some(r) if r.completed_at.is_some() => TourState::Completed,
        Some(_) if total == 0 => TourState::NotStarted,
        Some(r) => TourState::InProgress {
            index: clamp_index(r.current_point, total),
        },
    }
}

fn clamp_index(current_point: i64, total: usize) -> usize {
    (current_point.max(0) as usize).min(total.saturating_sub(1))
}

#[derive(Debug)]
pub struct TourRun<'a> {
    store: &'a SqliteStore,
    tour_id: i64,
    user_id: i64,
    points: Vec<TourPoint>,
    state: TourState,
    progress: i64,
}

impl<'a> TourRun<'a> {
    /// Begin the tour at its first stop.
    ///
    /// Restarting keeps the original `started_at`. A previously completed
    /// run starts over with its completion cleared.
    pub fn start(store: &'a SqliteStore, tour_id: i64, user_id: i64) -> Result<Self> {
        let points = store.get_points_for_tour(tour_id)?;
        if points.is_empty() {
            return Err(Error::InvalidInput(format!("tour {} has no stops", tour_id)));
        }

        let stored = store.get_user_tour_progress(tour_id, user_id)?;
        let progress = match &stored {
            Some(row) if row.completed_at.is_none() => row.progress.max(1),
            _ => 1,
        };
        let started_at = stored
            .as_ref()
            .and_then(|row| row.started_at.clone())
            .unwrap_or_else(now_rfc3339);

        let run = Self {
            store,
            tour_id,
            user_id,
            points,
            state: TourState::InProgress { index: 0 },
            progress,
        };
        store.upsert_user_tour_progress(&run.update(0, progress, Some(started_at), None))?;
        info!("User {} started tour {} ({} stops)", user_id, tour_id, run.total());
        Ok(run)
    }

    /// Rebuild a run from the stored row. `None` if the user has not
    /// started the tour or the tour has no stops.
    pub fn resume(store: &'a SqliteStore, tour_id: i64, user_id: i64) -> Result<Option<Self>> {
        let Some(row) = store.get_user_tour_progress(tour_id, user_id)? else {
            return Ok(None);
        };
        let points = store.get_points_for_tour(tour_id)?;
        let state = state_of(Some(&row), points.len());
        if state == TourState::NotStarted {
            return Ok(None);
        }
        Ok(Some(Self {
            store,
            tour_id,
            user_id,
            points,
            state,
            progress: row.progress,
        }))
    }

    pub fn tour_id(&self) -> i64 {
        self.tour_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn state(&self) -> TourState {
        self.state
    }

    /// Highest stop count reached.
    pub fn progress(&self) -> i64 {
        self.progress
    }

    pub fn total(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[TourPoint] {
        &self.points
    }

    pub fn current_point(&self) -> Option<&TourPoint> {
        match self.state {
            TourState::InProgress { index } => self.points.get(index),
            _ => None,
        }
    }

    /// Move to the next stop. Returns `false` at the last stop or when the
    /// run is not in progress.
    pub fn advance(&mut self) -> Result<bool> {
        match self.state {
            TourState::InProgress { index } if index + 1 < self.total() => self.move_to(index + 1),
            _ => Ok(false),
        }
    }

    /// Move to the previous stop. Returns `false` at the first stop.
    pub fn back(&mut self) -> Result<bool> {
        match self.state {
            TourState::InProgress { index } if index > 0 => self.move_to(index - 1),
            _ => Ok(false),
        }
    }

    /// Mark the tour completed and count it for the tour's city.
    /// Finishing an already completed run does nothing. On error the run
    /// stays in progress.
    pub fn finish(&mut self) -> Result<()> {
        let TourState::InProgress { index } = self.state else {
            return Ok(());
        };
        let progress = self.total() as i64;
        let update = self.update(index, progress, None, Some(now_rfc3339()));
        self.store.complete_user_tour(&update)?;
        self.progress = progress;
        self.state = TourState::Completed;
        info!("User {} completed tour {}", self.user_id, self.tour_id);
        Ok(())
    }

    fn move_to(&mut self, index: usize) -> Result<bool> {
        let progress = self.progress.max(index as i64 + 1);
        self.store.upsert_user_tour_progress(&self.update(index, progress, None, None))?;
        self.state = TourState::InProgress { index };
        self.progress = progress;
        debug!(
            "Tour {} user {}: stop {}/{}, progress {}",
            self.tour_id,
            self.user_id,
            index + 1,
            self.total(),
            self.progress
        );
        Ok(true)
    }

    fn update(
        &self,
        index: usize,
        progress: i64,
        started_at: Option<String>,
        completed_at: Option<String>,
    ) -> ProgressUpdate {
        ProgressUpdate {
            user_id: self.user_id,
            tour_id: self.tour_id,
            progress,
            current_point: index as i64,
            started_at,
            completed_at,
            rating_user: None,
        }
    }
}
