//! Marks stops as performed when a location sample falls inside their geofence
use itertools::Itertools;
use tracing::{debug, info};

use crate::{
    model::{LocationSample, Route, Trip},
    utils::haversine_distance_m,
};

pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 25.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("location sample has invalid coordinates ({lat}, {lng})")]
pub struct InvalidSampleError {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Copy, Clone, Debug)]
pub struct ProgressTracker {
    geofence_radius_m: f64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_GEOFENCE_RADIUS_M)
    }
}

impl ProgressTracker {
    pub fn new(geofence_radius_m: f64) -> Self {
        Self { geofence_radius_m }
    }

    /// Adds every unvisited stop within the geofence of `sample` to the trip's performed set
    /// and returns the ids that were newly marked.
    ///
    /// The performed set only ever grows, so repeated, stale or out-of-order samples
    /// can't undo or double count a stop. Trips that have ended are left untouched.
    pub fn record_sample(
        &self,
        trip: &mut Trip,
        route: &Route,
        sample: &LocationSample,
    ) -> Result<Vec<String>, InvalidSampleError> {
        if !sample.coordinates.is_valid() {
            return Err(InvalidSampleError {
                lat: sample.coordinates.lat,
                lng: sample.coordinates.lng,
            });
        }

        if trip.is_ended() {
            debug!(trip_id = %trip.id, "trip has ended, ignoring sample");
            return Ok(vec![]);
        }

        let reached = route
            .stopping_points()
            .iter()
            .filter(|sp| !trip.progress.is_performed(&sp.id))
            .filter(|sp| {
                haversine_distance_m(sample.coordinates, sp.coordinates) <= self.geofence_radius_m
            })
            .map(|sp| sp.id.clone())
            .collect_vec();

        for stop_id in &reached {
            if trip.progress.mark_performed(stop_id) {
                info!(trip_id = %trip.id, stop_id = %stop_id, "stopping point performed");
            }
        }

        if supersedes_last_fix(sample, trip.progress.last_fix()) {
            trip.progress.set_last_fix(sample.clone());
        } else {
            debug!(trip_id = %trip.id, "sample older than the last fix, keeping the last fix");
        }

        Ok(reached)
    }
}

/// Samples without a feed timestamp are ordered by arrival
fn supersedes_last_fix(sample: &LocationSample, last_fix: Option<&LocationSample>) -> bool {
    match (
        last_fix.and_then(|fix| fix.recorded_at),
        sample.recorded_at,
    ) {
        (Some(last), Some(new)) => new >= last,
        _ => true,
    }
}
