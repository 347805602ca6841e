use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use itertools::Either;
use serde::{Deserialize, Serialize};

/// WGS84 position in decimal degrees
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoppingPoint {
    pub id: String,
    pub description: String,
    /// Position in the outbound visit sequence, starting at 1
    pub execution_order: u32,
    pub coordinates: Coordinate,
}

/// A route with its stopping points kept sorted by `(execution_order, id)`.
///
/// Equal execution orders are broken by the stop id so the sequence never
/// depends on the order the backend returned the stops in.
#[derive(Clone, Debug)]
pub struct Route {
    pub id: String,
    pub description: String,
    stopping_points: Vec<StoppingPoint>,
    pub passenger_ids: BTreeSet<String>,
}

impl Route {
    pub fn new(
        id: String,
        description: String,
        stopping_points: Vec<StoppingPoint>,
        passenger_ids: BTreeSet<String>,
    ) -> Self {
        let mut route = Self {
            id,
            description,
            stopping_points,
            passenger_ids,
        };
        route.sort_stopping_points();
        route
    }

    pub fn stopping_points(&self) -> &[StoppingPoint] {
        &self.stopping_points
    }

    pub fn insert_stopping_point(&mut self, stopping_point: StoppingPoint) {
        self.stopping_points.push(stopping_point);
        self.sort_stopping_points();
    }

    pub fn remove_stopping_point(&mut self, id: &str) -> Option<StoppingPoint> {
        let index = self.stopping_points.iter().position(|sp| sp.id == id)?;
        let removed = self.stopping_points.remove(index);
        self.sort_stopping_points();
        Some(removed)
    }

    /// Stops in traversal order: ascending outbound, reversed on the way back
    pub fn directional_stops(
        &self,
        is_way_back: bool,
    ) -> impl Iterator<Item = &StoppingPoint> + '_ {
        if is_way_back {
            Either::Left(self.stopping_points.iter().rev())
        } else {
            Either::Right(self.stopping_points.iter())
        }
    }

    fn sort_stopping_points(&mut self) {
        self.stopping_points
            .sort_by(|a, b| (a.execution_order, &a.id).cmp(&(b.execution_order, &b.id)));
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Bus,
    Minibus,
    Van,
    /// Anything the dashboard has no icon for
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize)]
pub struct Vehicle {
    pub id: String,
    pub description: String,
    pub license_plate: String,
    pub vehicle_type: VehicleType,
}

/// A single reading from the vehicle's tracking feed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocationSample {
    pub coordinates: Coordinate,
    pub speed: f64,
    /// When the feed recorded the reading, if it says so
    pub recorded_at: Option<DateTime<Utc>>,
    /// When this monitor received the reading
    pub received_at: DateTime<Utc>,
}

/// Which stops were reached so far and where the vehicle was last seen
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TripProgress {
    performed: BTreeSet<String>,
    last_fix: Option<LocationSample>,
}

impl TripProgress {
    /// Progress resumed from the stops the backend already has on record
    pub fn resumed<I: IntoIterator<Item = String>>(performed: I) -> Self {
        Self {
            performed: performed.into_iter().collect(),
            last_fix: None,
        }
    }

    pub fn performed(&self) -> &BTreeSet<String> {
        &self.performed
    }

    pub fn is_performed(&self, stop_id: &str) -> bool {
        self.performed.contains(stop_id)
    }

    pub fn last_fix(&self) -> Option<&LocationSample> {
        self.last_fix.as_ref()
    }

    /// Returns true if the stop wasn't marked before
    pub(crate) fn mark_performed(&mut self, stop_id: &str) -> bool {
        self.performed.insert(stop_id.to_string())
    }

    pub(crate) fn set_last_fix(&mut self, sample: LocationSample) {
        self.last_fix = Some(sample);
    }
}

#[derive(Clone, Debug)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub vehicle_id: String,
    pub start_time: DateTime<Utc>,
    /// Set by an administrator when the trip is closed. Progress is frozen afterwards.
    pub end_time: Option<DateTime<Utc>>,
    pub is_way_back: bool,
    pub progress: TripProgress,
}

impl Trip {
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Distance, duration and path from the vehicle to its target stop
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TravelEstimate {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<Coordinate>,
    pub target_id: String,
    /// Vehicle position the estimate was requested from
    pub origin: Coordinate,
    pub computed_at: DateTime<Utc>,
}
