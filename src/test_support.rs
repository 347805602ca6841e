//! Fixtures and in-memory fakes of the backend and the directions provider
use std::{
    collections::{BTreeSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{DateTime, TimeZone, Utc};

use crate::{
    api_clients::{Directions, DirectionsError, DirectionsProvider, FleetApi, FleetApiError},
    model::{
        Coordinate, LocationSample, Route, StoppingPoint, Trip, TripProgress, Vehicle, VehicleType,
    },
};

pub fn stop(id: &str, execution_order: u32, lat: f64, lng: f64) -> StoppingPoint {
    StoppingPoint {
        id: id.to_string(),
        description: format!("stop {id}"),
        execution_order,
        coordinates: Coordinate::new(lat, lng),
    }
}

/// a, b and c, ~111 m apart along the equator
pub fn three_stop_route() -> Route {
    Route::new(
        "r1".to_string(),
        "Equator line".to_string(),
        vec![
            stop("c", 3, 0.0, 0.002),
            stop("a", 1, 0.0, 0.0),
            stop("b", 2, 0.0, 0.001),
        ],
        BTreeSet::from(["p1".to_string()]),
    )
}

pub fn trip(is_way_back: bool) -> Trip {
    Trip {
        id: "t1".to_string(),
        route_id: "r1".to_string(),
        vehicle_id: "v1".to_string(),
        start_time: start_time(),
        end_time: None,
        is_way_back,
        progress: TripProgress::default(),
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 8, 26, 1, 12, 45).unwrap()
}

pub fn vehicle() -> Vehicle {
    Vehicle {
        id: "v1".to_string(),
        description: "Marcopolo Volare".to_string(),
        license_plate: "ABC-1234".to_string(),
        vehicle_type: VehicleType::Minibus,
    }
}

pub fn sample_at(lat: f64, lng: f64) -> LocationSample {
    LocationSample {
        coordinates: Coordinate::new(lat, lng),
        speed: 30.0,
        recorded_at: None,
        received_at: Utc::now(),
    }
}

pub fn directions(distance_m: f64, duration_s: f64) -> Directions {
    Directions {
        distance_m,
        duration_s,
        geometry: vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001)],
    }
}

/// Answers with scripted results, falls back to a fixed 100 m / 30 s path
#[derive(Clone, Default)]
pub struct FakeDirections {
    responses: Arc<Mutex<VecDeque<Result<Directions, DirectionsError>>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeDirections {
    pub fn push(&self, response: Result<Directions, DirectionsError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DirectionsProvider for FakeDirections {
    async fn directions(
        &self,
        _origin: Coordinate,
        _destination: Coordinate,
    ) -> Result<Directions, DirectionsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(directions(100.0, 30.0)))
    }
}

#[derive(Default)]
struct FakeFleetState {
    trip: Option<Trip>,
    route: Option<Route>,
    vehicle: Option<Vehicle>,
    locations: VecDeque<Option<LocationSample>>,
    failing_trip_fetches: usize,
    trip_fetches: usize,
}

/// In-memory backend. Locations are handed out in push order, then `None`.
#[derive(Clone, Default)]
pub struct FakeFleet {
    state: Arc<Mutex<FakeFleetState>>,
}

impl FakeFleet {
    pub fn new(trip: Option<Trip>, route: Option<Route>, vehicle: Option<Vehicle>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeFleetState {
                trip,
                route,
                vehicle,
                ..Default::default()
            })),
        }
    }

    pub fn push_location(&self, sample: Option<LocationSample>) {
        self.state.lock().unwrap().locations.push_back(sample);
    }

    /// The next `count` trip fetches answer 503
    pub fn fail_trip_fetches(&self, count: usize) {
        self.state.lock().unwrap().failing_trip_fetches = count;
    }

    pub fn end_trip(&self, end_time: DateTime<Utc>) {
        if let Some(trip) = self.state.lock().unwrap().trip.as_mut() {
            trip.end_time = Some(end_time);
        }
    }

    pub fn trip_fetches(&self) -> usize {
        self.state.lock().unwrap().trip_fetches
    }
}

impl FleetApi for FakeFleet {
    async fn get_trip(&self, trip_id: &str) -> Result<Trip, FleetApiError> {
        let mut state = self.state.lock().unwrap();
        state.trip_fetches += 1;

        if state.failing_trip_fetches > 0 {
            state.failing_trip_fetches -= 1;
            return Err(FleetApiError::UnexpectedStatus {
                resource: "trip",
                status: 503,
            });
        }

        state
            .trip
            .clone()
            .filter(|t| t.id == trip_id)
            .ok_or_else(|| FleetApiError::NotFound {
                resource: "trip",
                id: trip_id.to_string(),
            })
    }

    async fn get_route(&self, route_id: &str) -> Result<Route, FleetApiError> {
        self.state
            .lock()
            .unwrap()
            .route
            .clone()
            .filter(|r| r.id == route_id)
            .ok_or_else(|| FleetApiError::NotFound {
                resource: "route",
                id: route_id.to_string(),
            })
    }

    async fn get_vehicle(&self, vehicle_id: &str) -> Result<Vehicle, FleetApiError> {
        self.state
            .lock()
            .unwrap()
            .vehicle
            .clone()
            .filter(|v| v.id == vehicle_id)
            .ok_or_else(|| FleetApiError::NotFound {
                resource: "vehicle",
                id: vehicle_id.to_string(),
            })
    }

    async fn get_current_vehicle_location(
        &self,
        _trip_id: &str,
    ) -> Result<Option<LocationSample>, FleetApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .locations
            .pop_front()
            .flatten())
    }
}
