//! Follows one trip live: loads it, then runs the tracker, target selector and
//! estimate refresher on every tick until the trip is complete
use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    spawn,
    sync::{RwLock, broadcast},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

use crate::{
    api_clients::{DirectionsProvider, FleetApi, FleetApiError},
    model::{LocationSample, Route, StoppingPoint, TravelEstimate, Trip, Vehicle},
    tracking::{
        DEFAULT_GEOFENCE_RADIUS_M, DEFAULT_MIN_REFRESH_DISTANCE_M, EstimateRefresher,
        ProgressTracker, RefreshOutcome, select_target,
    },
};

/// Latest published state of a monitoring session
pub type SnapshotStore = Arc<RwLock<SessionSnapshot>>;

/// Ticks in a row without a target before the route counts as complete
const ROUTE_COMPLETE_TICKS: u32 = 2;

#[derive(Copy, Clone, Debug)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
    pub geofence_radius_m: f64,
    pub min_refresh_distance_m: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            geofence_radius_m: DEFAULT_GEOFENCE_RADIUS_M,
            min_refresh_distance_m: DEFAULT_MIN_REFRESH_DISTANCE_M,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingTrip,
    AwaitingRoute,
    AwaitingVehicle,
    Tracking,
    Completed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every stopping point was performed
    RouteComplete,
    /// The backend has an end time for the trip
    TripEnded,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    EstimateUnavailable,
    FetchFailed,
    InvalidSample,
}

/// A recoverable problem worth showing to whoever watches the trip
#[derive(Clone, Debug, Serialize)]
pub struct SessionNotice {
    pub kind: NoticeKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub trip_id: String,
    pub state: SessionState,
    pub is_way_back: bool,
    pub vehicle: Option<Vehicle>,
    pub stops_total: usize,
    pub performed: BTreeSet<String>,
    /// `None` once the route is complete or before tracking starts
    pub target: Option<StoppingPoint>,
    pub route_complete: bool,
    pub trip_ended: bool,
    pub last_fix: Option<LocationSample>,
    pub estimate: Option<TravelEstimate>,
    pub completion: Option<CompletionReason>,
    /// Why the session couldn't start tracking
    pub load_error: Option<String>,
    pub last_notice: Option<SessionNotice>,
    pub ticks: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(trip_id: &str) -> Self {
        Self {
            trip_id: trip_id.to_string(),
            state: SessionState::AwaitingTrip,
            is_way_back: false,
            vehicle: None,
            stops_total: 0,
            performed: BTreeSet::new(),
            target: None,
            route_complete: false,
            trip_ended: false,
            last_fix: None,
            estimate: None,
            completion: None,
            load_error: None,
            last_notice: None,
            ticks: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stop,
}

struct SharedSession {
    /// Bumped on cancel. Results of requests started under an older generation are dropped.
    generation: AtomicU64,
    snapshot: SnapshotStore,
    notices: broadcast::Sender<SessionNotice>,
}

pub struct TripMonitor<A, P> {
    trip_id: String,
    api: A,
    tracker: ProgressTracker,
    refresher: EstimateRefresher<P>,
    tick_interval: Duration,
    state: SessionState,
    trip: Option<Trip>,
    route: Option<Route>,
    vehicle: Option<Vehicle>,
    target: Option<StoppingPoint>,
    ticks_without_target: u32,
    completion: Option<CompletionReason>,
    load_error: Option<String>,
    last_notice: Option<SessionNotice>,
    ticks: u64,
    shared: Arc<SharedSession>,
    generation: u64,
}

impl<A: FleetApi, P: DirectionsProvider> TripMonitor<A, P> {
    pub fn new(trip_id: String, api: A, directions: P, settings: MonitorSettings) -> Self {
        let (notices, _) = broadcast::channel(16);
        let shared = Arc::new(SharedSession {
            generation: AtomicU64::new(0),
            snapshot: Arc::new(RwLock::new(SessionSnapshot::new(&trip_id))),
            notices,
        });

        Self {
            trip_id,
            api,
            tracker: ProgressTracker::new(settings.geofence_radius_m),
            refresher: EstimateRefresher::new(directions, settings.min_refresh_distance_m),
            tick_interval: settings.tick_interval,
            state: SessionState::AwaitingTrip,
            trip: None,
            route: None,
            vehicle: None,
            target: None,
            ticks_without_target: 0,
            completion: None,
            load_error: None,
            last_notice: None,
            ticks: 0,
            shared,
            generation: 0,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let trip = self.trip.as_ref();

        SessionSnapshot {
            trip_id: self.trip_id.clone(),
            state: self.state,
            is_way_back: trip.is_some_and(|t| t.is_way_back),
            vehicle: self.vehicle.clone(),
            stops_total: self.route.as_ref().map_or(0, |r| r.stopping_points().len()),
            performed: trip
                .map(|t| t.progress.performed().clone())
                .unwrap_or_default(),
            target: self.target.clone(),
            route_complete: self.ticks_without_target > 0,
            trip_ended: trip.is_some_and(Trip::is_ended),
            last_fix: trip.and_then(|t| t.progress.last_fix().cloned()),
            estimate: self.refresher.estimate().cloned(),
            completion: self.completion,
            load_error: self.load_error.clone(),
            last_notice: self.last_notice.clone(),
            ticks: self.ticks,
            updated_at: Utc::now(),
        }
    }

    /// One timer firing: finishes loading if needed, then runs a tick
    pub async fn step(&mut self) -> StepOutcome {
        let outcome = match self.state {
            SessionState::Completed => return StepOutcome::Stop,
            SessionState::Tracking => self.tick().await,
            _ => match self.load_prerequisites().await {
                StepOutcome::Continue if self.state == SessionState::Tracking => self.tick().await,
                outcome => outcome,
            },
        };

        self.publish().await;

        outcome
    }

    /// Ticks every `tick_interval` until the trip completes, loading fails or the session is
    /// cancelled. A tick still running when the timer fires again swallows that firing.
    pub async fn run(mut self) -> SessionSnapshot {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(trip_id = %self.trip_id, "starting trip monitor");

        loop {
            ticker.tick().await;

            if !self.is_current() {
                info!(trip_id = %self.trip_id, "trip monitor cancelled");
                break;
            }

            if self.step().await == StepOutcome::Stop {
                break;
            }
        }

        self.snapshot()
    }

    pub fn spawn(self) -> MonitorHandle
    where
        A: Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let shared = self.shared.clone();
        let task = spawn(self.run());

        MonitorHandle {
            shared,
            task: Some(task),
        }
    }

    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    async fn load_prerequisites(&mut self) -> StepOutcome {
        if self.state == SessionState::AwaitingTrip {
            let res = self.api.get_trip(&self.trip_id).await;
            if !self.is_current() {
                return StepOutcome::Stop;
            }

            match res {
                Ok(trip) => {
                    info!(trip_id = %trip.id, route_id = %trip.route_id, "loaded trip");
                    self.trip = Some(trip);
                    self.state = SessionState::AwaitingRoute;
                }
                Err(e) => return self.load_failed(e),
            }
        }

        let Some((route_id, vehicle_id)) = self
            .trip
            .as_ref()
            .map(|t| (t.route_id.clone(), t.vehicle_id.clone()))
        else {
            self.state = SessionState::AwaitingTrip;
            return StepOutcome::Continue;
        };

        if self.state == SessionState::AwaitingRoute {
            let res = self.api.get_route(&route_id).await;
            if !self.is_current() {
                return StepOutcome::Stop;
            }

            match res {
                Ok(route) => {
                    if route.stopping_points().is_empty() {
                        warn!(%route_id, "route has no usable stopping points");
                    }
                    info!(
                        %route_id,
                        stops = route.stopping_points().len(),
                        "loaded route"
                    );
                    self.route = Some(route);
                    self.state = SessionState::AwaitingVehicle;
                }
                Err(e) => return self.load_failed(e),
            }
        }

        if self.state == SessionState::AwaitingVehicle {
            let res = self.api.get_vehicle(&vehicle_id).await;
            if !self.is_current() {
                return StepOutcome::Stop;
            }

            match res {
                Ok(vehicle) => {
                    info!(%vehicle_id, plate = %vehicle.license_plate, "loaded vehicle, tracking");
                    self.vehicle = Some(vehicle);
                    self.state = SessionState::Tracking;
                }
                Err(e) => return self.load_failed(e),
            }
        }

        StepOutcome::Continue
    }

    fn load_failed(&mut self, err: FleetApiError) -> StepOutcome {
        if err.is_permanent() {
            error!(state = ?self.state, "{err}");
            self.load_error = Some(err.to_string());
            StepOutcome::Stop
        } else {
            self.notify(NoticeKind::FetchFailed, format!("{err}, retrying"));
            StepOutcome::Continue
        }
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.trip_id, tick = self.ticks + 1))]
    async fn tick(&mut self) -> StepOutcome {
        self.ticks += 1;

        // the end time is set by an administrator in the dashboard, watch for it
        let fresh = self.api.get_trip(&self.trip_id).await;
        if !self.is_current() {
            return StepOutcome::Stop;
        }
        match fresh {
            Ok(fresh) => {
                if let (Some(trip), Some(end_time)) = (self.trip.as_mut(), fresh.end_time) {
                    trip.end_time.get_or_insert(end_time);
                }
            }
            Err(e) => self.notify(NoticeKind::FetchFailed, format!("{e}")),
        }

        if self.trip.as_ref().is_some_and(Trip::is_ended) {
            return self.complete(CompletionReason::TripEnded);
        }

        let location = self.api.get_current_vehicle_location(&self.trip_id).await;
        if !self.is_current() {
            return StepOutcome::Stop;
        }
        let sample = match location {
            Ok(sample) => sample,
            Err(e) => {
                self.notify(NoticeKind::FetchFailed, format!("{e}"));
                None
            }
        };

        let (Some(trip), Some(route)) = (self.trip.as_mut(), self.route.as_ref()) else {
            error!(state = ?self.state, "tracking without a loaded trip and route");
            return StepOutcome::Stop;
        };

        let invalid_sample = match &sample {
            Some(sample) => match self.tracker.record_sample(trip, route, sample) {
                Ok(reached) => {
                    debug!(
                        ?reached,
                        performed = trip.progress.performed().len(),
                        "recorded sample"
                    );
                    None
                }
                Err(e) => Some(e),
            },
            None => {
                debug!("no live fix yet");
                None
            }
        };

        let has_stops = !route.stopping_points().is_empty();
        let target = select_target(route, &trip.progress, trip.is_way_back).cloned();
        let position = trip.progress.last_fix().map(|fix| fix.coordinates);

        if let Some(e) = invalid_sample {
            self.notify(NoticeKind::InvalidSample, format!("skipping sample: {e}"));
        }

        match &target {
            Some(target) => {
                self.ticks_without_target = 0;
                debug!(target_id = %target.id, "next stopping point");
            }
            None if has_stops => self.ticks_without_target += 1,
            // nothing to perform, only the trip's end time can complete it
            None => debug!("route has no usable stopping points"),
        }

        let refreshed = self.refresher.refresh(position, target.as_ref()).await;
        if !self.is_current() {
            return StepOutcome::Stop;
        }
        match refreshed {
            Ok(RefreshOutcome::Refreshed(estimate)) => debug!(
                distance_m = estimate.distance_m,
                duration_s = estimate.duration_s,
                "travel estimate refreshed"
            ),
            Ok(_) => {}
            Err(e) => self.notify(
                NoticeKind::EstimateUnavailable,
                format!("{e}: {}", e.source),
            ),
        }

        self.target = target;

        if self.ticks_without_target >= ROUTE_COMPLETE_TICKS {
            return self.complete(CompletionReason::RouteComplete);
        }

        StepOutcome::Continue
    }

    fn complete(&mut self, reason: CompletionReason) -> StepOutcome {
        info!(trip_id = %self.trip_id, ?reason, "trip monitoring completed");
        self.state = SessionState::Completed;
        self.completion = Some(reason);
        StepOutcome::Stop
    }

    fn notify(&mut self, kind: NoticeKind, message: String) {
        debug!(?kind, "{message}");
        let notice = SessionNotice {
            kind,
            message,
            at: Utc::now(),
        };
        // nobody listening is fine
        _ = self.shared.notices.send(notice.clone());
        self.last_notice = Some(notice);
    }

    async fn publish(&self) {
        let snapshot = self.snapshot();
        let mut published = self.shared.snapshot.write().await;
        if self.is_current() {
            *published = snapshot;
        }
    }
}

/// Owns a spawned monitoring session. Dropping it cancels the session.
pub struct MonitorHandle {
    shared: Arc<SharedSession>,
    task: Option<JoinHandle<SessionSnapshot>>,
}

impl MonitorHandle {
    pub fn snapshot_store(&self) -> SnapshotStore {
        self.shared.snapshot.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.shared.notices.subscribe()
    }

    /// Stops the timer. Requests already in flight are ignored when they resolve.
    pub fn cancel(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Waits for the session to stop on its own. `None` if it was cancelled.
    pub async fn finished(&mut self) -> Option<SessionSnapshot> {
        let task = self.task.as_mut()?;
        let res = task.await;
        self.task = None;

        match res {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                if !e.is_cancelled() {
                    error!("trip monitor task failed: {e}");
                }
                None
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
