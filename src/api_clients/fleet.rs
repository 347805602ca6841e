//! Read access to the fleet backend: trips, routes, vehicles and live locations
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{Instrument, info_span};

use crate::model::{
    LocationSample, Route, Trip, Vehicle,
    fleet_api_model::{FleetRoute, FleetTracking, FleetTrip, FleetVehicle},
};

pub trait FleetApi {
    fn get_trip(&self, trip_id: &str) -> impl Future<Output = Result<Trip, FleetApiError>> + Send;

    fn get_route(&self, route_id: &str)
    -> impl Future<Output = Result<Route, FleetApiError>> + Send;

    fn get_vehicle(
        &self,
        vehicle_id: &str,
    ) -> impl Future<Output = Result<Vehicle, FleetApiError>> + Send;

    /// `None` when the vehicle hasn't reported a position for the trip yet
    fn get_current_vehicle_location(
        &self,
        trip_id: &str,
    ) -> impl Future<Output = Result<Option<LocationSample>, FleetApiError>> + Send;
}

#[derive(thiserror::Error, Debug)]
pub enum FleetApiError {
    #[error("{resource} {id} does not exist")]
    NotFound { resource: &'static str, id: String },

    #[error("backend answered {status} for {resource}")]
    UnexpectedStatus { resource: &'static str, status: u16 },

    #[error("error fetching {resource}")]
    HttpRequestError {
        resource: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("error parsing {resource} \n{body}")]
    ParsingError {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl FleetApiError {
    /// Whether retrying the same request can't help
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FleetApiError::NotFound { .. } | FleetApiError::ParsingError { .. }
        )
    }
}

#[derive(Clone, Debug)]
pub struct HttpFleetApi {
    client: Client,
    base_url: String,
}

impl HttpFleetApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns `None` for an empty body
    async fn fetch(
        &self,
        resource: &'static str,
        id: &str,
        path: &str,
    ) -> Result<Option<String>, FleetApiError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .instrument(info_span!("Fetching", resource))
            .await
            .map_err(|source| FleetApiError::HttpRequestError { resource, source })?;

        match response.status() {
            // the backend answers 400 for malformed object ids
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                return Err(FleetApiError::NotFound {
                    resource,
                    id: id.to_string(),
                });
            }
            StatusCode::NO_CONTENT => return Ok(None),
            status if !status.is_success() => {
                return Err(FleetApiError::UnexpectedStatus {
                    resource,
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let body = response
            .text()
            .instrument(info_span!("Reading body of response"))
            .await
            .map_err(|source| FleetApiError::HttpRequestError { resource, source })?;

        Ok(non_empty_body(body))
    }

    async fn fetch_record<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        id: &str,
        path: &str,
    ) -> Result<T, FleetApiError> {
        match self.fetch(resource, id, path).await? {
            Some(body) => parse(resource, body),
            None => Err(FleetApiError::NotFound {
                resource,
                id: id.to_string(),
            }),
        }
    }
}

impl FleetApi for HttpFleetApi {
    #[tracing::instrument(err, skip(self))]
    async fn get_trip(&self, trip_id: &str) -> Result<Trip, FleetApiError> {
        let trip: FleetTrip = self
            .fetch_record("trip", trip_id, &format!("trips/{trip_id}"))
            .await?;

        Ok(trip.into())
    }

    #[tracing::instrument(err, skip(self))]
    async fn get_route(&self, route_id: &str) -> Result<Route, FleetApiError> {
        let route: FleetRoute = self
            .fetch_record("route", route_id, &format!("routes/{route_id}"))
            .await?;

        Ok(route.into())
    }

    #[tracing::instrument(err, skip(self))]
    async fn get_vehicle(&self, vehicle_id: &str) -> Result<Vehicle, FleetApiError> {
        let vehicle: FleetVehicle = self
            .fetch_record("vehicle", vehicle_id, &format!("vehicles/{vehicle_id}"))
            .await?;

        Ok(vehicle.into())
    }

    #[tracing::instrument(err, skip(self))]
    async fn get_current_vehicle_location(
        &self,
        trip_id: &str,
    ) -> Result<Option<LocationSample>, FleetApiError> {
        let body = self
            .fetch(
                "vehicle location",
                trip_id,
                &format!("trips/{trip_id}/currentVehicleLocation"),
            )
            .await?;

        let Some(body) = body else {
            return Ok(None);
        };

        let tracking: FleetTracking = parse("vehicle location", body)?;

        Ok(Some(tracking.into_sample(Utc::now())))
    }
}

/// Express sends an empty body when the tracking list is empty, some versions send `null` or `{}`
fn non_empty_body(body: String) -> Option<String> {
    if matches!(body.trim(), "" | "null" | "{}") {
        None
    } else {
        Some(body)
    }
}

fn parse<T: DeserializeOwned>(resource: &'static str, body: String) -> Result<T, FleetApiError> {
    serde_json::from_str(&body).map_err(|source| FleetApiError::ParsingError {
        resource,
        source,
        body,
    })
}
