use anyhow::{Error, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::trip_model::{
    Coordinate, LocationSample, Route, StoppingPoint, Trip, TripProgress, Vehicle, VehicleType,
};

#[derive(Debug, Deserialize, Serialize)]
pub struct FleetTrip {
    #[serde(rename = "_id")]
    pub id: String,
    pub route_id: String,
    pub vehicle_id: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    /// Null or missing while the trip is running
    #[serde(rename = "endTime", default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "isWayBack", default)]
    pub is_way_back: bool,
    /// Stops the backend already recorded as performed. Older records don't have it.
    #[serde(rename = "stoppingPointsPerformed_id", default)]
    pub stopping_points_performed_id: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FleetRoute {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "stoppingPoints", default)]
    pub stopping_points: Vec<FleetStoppingPoint>,
    #[serde(rename = "passengers_id", default)]
    pub passengers_id: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FleetStoppingPoint {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Should be positive, the dashboard forms don't enforce it.
    /// A bad form value is stored as NaN and comes back as `null`.
    #[serde(rename = "executionOrder", default)]
    pub execution_order: Option<i64>,
    #[serde(default)]
    pub coordinates: Option<FleetCoordinate>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct FleetCoordinate {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FleetVehicle {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "licensePlate")]
    pub license_plate: String,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
}

/// Body of `/trips/{id}/currentVehicleLocation`
#[derive(Debug, Deserialize, Serialize)]
pub struct FleetTracking {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(rename = "recordedAt", default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl FleetCoordinate {
    fn coordinate(self) -> Option<Coordinate> {
        Some(Coordinate::new(self.lat?, self.lng?))
    }
}

impl From<FleetTrip> for Trip {
    fn from(value: FleetTrip) -> Self {
        Trip {
            id: value.id,
            route_id: value.route_id,
            vehicle_id: value.vehicle_id,
            start_time: value.start_time,
            end_time: value.end_time,
            is_way_back: value.is_way_back,
            progress: TripProgress::resumed(value.stopping_points_performed_id),
        }
    }
}

impl TryFrom<FleetStoppingPoint> for StoppingPoint {
    type Error = Error;

    fn try_from(value: FleetStoppingPoint) -> Result<Self, Self::Error> {
        let coordinates = value
            .coordinates
            .and_then(FleetCoordinate::coordinate)
            .ok_or_else(|| anyhow!("stopping point {} has no coordinates", value.id))?;
        if !coordinates.is_valid() {
            bail!(
                "stopping point {} has invalid coordinates {:?}",
                value.id,
                coordinates
            );
        }

        let execution_order = match value.execution_order.map(u32::try_from) {
            Some(Ok(order)) if order > 0 => order,
            Some(_) => bail!(
                "stopping point {} has non-positive execution order {:?}",
                value.id,
                value.execution_order
            ),
            None => bail!("stopping point {} has no execution order", value.id),
        };

        Ok(StoppingPoint {
            id: value.id,
            description: value.description,
            execution_order,
            coordinates,
        })
    }
}

/// Stops that can't be ordered or located are left out of the route
impl From<FleetRoute> for Route {
    fn from(value: FleetRoute) -> Self {
        let stopping_points = value
            .stopping_points
            .into_iter()
            .filter_map(|sp| match StoppingPoint::try_from(sp) {
                Ok(sp) => Some(sp),
                Err(e) => {
                    warn!(route_id = %value.id, "skipping stopping point: {e}");
                    None
                }
            })
            .collect();

        Route::new(
            value.id,
            value.description,
            stopping_points,
            value.passengers_id.into_iter().collect(),
        )
    }
}

impl From<FleetVehicle> for Vehicle {
    fn from(value: FleetVehicle) -> Self {
        Vehicle {
            id: value.id,
            description: value.description,
            license_plate: value.license_plate,
            vehicle_type: value.vehicle_type,
        }
    }
}

impl FleetTracking {
    pub fn into_sample(self, received_at: DateTime<Utc>) -> LocationSample {
        LocationSample {
            coordinates: Coordinate::new(self.lat, self.lng),
            speed: self.speed,
            recorded_at: self.recorded_at,
            received_at,
        }
    }
}
